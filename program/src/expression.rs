
use strum_macros::IntoStaticStr;

/// Index of a variable declared by a `Let` statement.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VarId(pub usize);

/// Index of a one-slot state cell.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CellId(pub usize);

/// Index of a sample buffer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BufferId(pub usize);

/// Index of an externally controlled parameter.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ParamId(pub usize);

#[derive(Clone, Copy, Debug, Eq, Hash, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
	// Arithmetic
	Add,
	Sub,
	Mul,
	Div,
	Min,
	Max,

	// Comparisons, yielding 1 or 0
	#[strum(serialize = "gt")]
	Greater,
	#[strum(serialize = "gte")]
	GreaterEq,
	#[strum(serialize = "lt")]
	Less,
	#[strum(serialize = "lte")]
	LessEq,
	Eq,
	Neq,
}

impl BinOp {
	/// Prefix used for names of nodes computing this operation.
	pub fn tag(self) -> &'static str {
		self.into()
	}

	pub fn is_comparison(self) -> bool {
		use BinOp::*;
		matches!(self, Greater | GreaterEq | Less | LessEq | Eq | Neq)
	}

	/// Infix operator, if the operation is written infix.
	pub fn symbol(self) -> Option<&'static str> {
		use BinOp::*;
		match self {
			Add => Some("+"),
			Sub => Some("-"),
			Mul => Some("*"),
			Div => Some("/"),
			Min | Max => None,
			Greater => Some(">"),
			GreaterEq => Some(">="),
			Less => Some("<"),
			LessEq => Some("<="),
			Eq => Some("=="),
			Neq => Some("!="),
		}
	}

	pub fn apply(self, left: f64, right: f64) -> f64 {
		use BinOp::*;
		let truth = |b: bool| if b { 1.0 } else { 0.0 };
		match self {
			Add => left + right,
			Sub => left - right,
			Mul => left * right,
			Div => left / right,
			Min => left.min(right),
			Max => left.max(right),
			Greater => truth(left > right),
			GreaterEq => truth(left >= right),
			Less => truth(left < right),
			LessEq => truth(left <= right),
			Eq => truth(left == right),
			Neq => truth(left != right),
		}
	}
}

/// How a value is kept inside `[min, max)`.
#[derive(Clone, Copy, Debug, Default, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Bound {
	#[default]
	Wrap,
	Clamp,
}

impl Bound {
	pub fn apply(self, value: f64, min: f64, max: f64) -> f64 {
		match self {
			Bound::Wrap => wrap(value, min, max),
			Bound::Clamp => value.max(min).min(max),
		}
	}
}

/// Wrap `value` into the half-open range `[min, max)`.
pub fn wrap(value: f64, min: f64, max: f64) -> f64 {
	let range = max - min;
	if !(range > 0.0) {
		return min;
	}
	if value >= min && value < max {
		return value;
	}
	let wrapped = min + (value - min).rem_euclid(range);
	// Rounding can land exactly on max for values just below min
	if wrapped >= max { min } else { wrapped }
}

#[derive(Clone, Copy, Debug, Default, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Interpolation {
	None,
	#[default]
	Linear,
}

/// Unit of a buffer read index: sample offset, or phase in `[0, 1)` of the length.
#[derive(Clone, Copy, Debug, Default, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum IndexMode {
	#[default]
	Samples,
	Phase,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
	Constant(f64),
	Var(VarId),
	Param(ParamId),
	Cell(CellId),
	Binary {
		op: BinOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	Select {
		condition: Box<Expr>,
		then: Box<Expr>,
		otherwise: Box<Expr>,
	},
	Bounded {
		bound: Bound,
		value: Box<Expr>,
		min: Box<Expr>,
		max: Box<Expr>,
	},
	BufferRead {
		buffer: BufferId,
		index: Box<Expr>,
		interpolation: Interpolation,
		mode: IndexMode,
	},
}

impl Expr {
	pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
		Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
	}

	pub fn select(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
		Expr::Select {
			condition: Box::new(condition),
			then: Box::new(then),
			otherwise: Box::new(otherwise),
		}
	}

	pub fn bounded(bound: Bound, value: Expr, min: Expr, max: Expr) -> Expr {
		Expr::Bounded {
			bound,
			value: Box::new(value),
			min: Box::new(min),
			max: Box::new(max),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
	/// Declare a variable for this tick.
	Let { var: VarId, expr: Expr },
	/// Store the value a cell holds during the next tick.
	CellStore { cell: CellId, expr: Expr },
	/// Write a sample; the index wraps around the buffer length.
	BufferStore { buffer: BufferId, index: Expr, value: Expr },
}

impl Statement {
	pub fn is_store(&self) -> bool {
		!matches!(self, Statement::Let { .. })
	}
}
