
use std::collections::HashMap;

use crate::graph::NodeId;

/// Issues strictly increasing ids, one per node instantiation.
#[derive(Clone, Debug)]
pub struct UidAllocator {
	next: u32,
}

impl Default for UidAllocator {
	fn default() -> Self {
		UidAllocator { next: 1 }
	}
}

impl UidAllocator {
	pub fn next_uid(&mut self) -> u32 {
		let uid = self.next;
		self.next += 1;
		uid
	}
}

/// Mapping of node names to the nodes carrying them.
#[derive(Clone, Debug, Default)]
pub struct Names {
	uids: UidAllocator,
	nodes: HashMap<String, NodeId>,
}

impl Names {
	/// Make a fresh `<tag><uid>` name and register it for `node`.
	pub fn allocate(&mut self, tag: &str, node: NodeId) -> String {
		let name = format!("{}{}", tag, self.uids.next_uid());
		debug_assert!(!self.nodes.contains_key(&name));
		self.nodes.insert(name.clone(), node);
		name
	}

	pub fn lookup(&self, name: &str) -> Option<NodeId> {
		self.nodes.get(name).copied()
	}
}
