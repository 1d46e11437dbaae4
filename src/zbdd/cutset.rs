//! Storage for generated cut sets in MOCUS-style gate expansion
//!
//! The container is a ZBDD whose vertex ordering places gate proxies above
//! variables: later-indexed gates sit nearest the root, and every variable
//! order is offset past the whole gate block. The expansion loop pops the
//! top gate, substitutes its own cut sets, and merges the result until only
//! variables and modules remain.

use log::debug;
use rustc_hash::FxHashMap;

use super::{Vertex, VertexPtr, Zbdd};
use crate::pdag::{Connective, GatePtr};
use crate::settings::Settings;

/// ZBDD container of intermediate and final cut sets for one module.
pub struct CutSetContainer {
    zbdd: Zbdd,
    index_ceiling: i32,
}

impl CutSetContainer {
    /// Creates an empty container.
    ///
    /// `gate_index_bound` is the exclusive lower bound for gate indices;
    /// basic events are indexed at or below it. `index_ceiling` is the
    /// upper bound of all node indices, used to flip gate indices into
    /// top-of-diagram orders.
    pub fn new(
        settings: &Settings,
        module_index: i32,
        gate_index_bound: i32,
        index_ceiling: i32,
    ) -> Self {
        let mut zbdd = Zbdd::new_base(settings, false, module_index);
        zbdd.gate_index_bound = Some(gate_index_bound);
        CutSetContainer {
            zbdd,
            index_ceiling,
        }
    }

    /// Order of a gate vertex: later-indexed gates closer to the root.
    fn gate_order(&self, gate_index: i32) -> i32 {
        debug_assert!(gate_index <= self.index_ceiling);
        self.index_ceiling - gate_index + 1
    }

    /// Order of a variable vertex: past the whole gate block.
    fn variable_order(&self, order: i32) -> i32 {
        let bound = self
            .zbdd
            .gate_index_bound
            .expect("The container always bounds gate indices.");
        (self.index_ceiling - bound + 1) + order
    }

    /// Converts an AND/OR gate into intermediate cut sets.
    pub fn convert_gate(&mut self, gate: &GatePtr) -> VertexPtr {
        let (connective, variable_args, gate_args) = {
            let g = gate.borrow();
            debug_assert!(
                matches!(g.connective(), Connective::And | Connective::Or),
                "Only normalized gates are expanded."
            );
            debug_assert!(!g.constant());
            (
                g.connective(),
                g.variable_args().to_vec(),
                g.gate_args().to_vec(),
            )
        };
        let mut args: Vec<VertexPtr> = Vec::new();
        for (signed_index, var) in &variable_args {
            let order = self.variable_order(var.order());
            let base = self.zbdd.base.clone();
            let empty = self.zbdd.empty.clone();
            args.push(
                self.zbdd
                    .find_or_add(*signed_index, &base, &empty, order, false, false),
            );
        }
        for (signed_index, child) in &gate_args {
            debug_assert!(
                *signed_index > 0,
                "Complements must be pushed down to variables."
            );
            let (index, module, coherent) = {
                let c = child.borrow();
                (c.index(), c.module(), c.coherent())
            };
            let order = self.gate_order(index);
            let base = self.zbdd.base.clone();
            let empty = self.zbdd.empty.clone();
            args.push(
                self.zbdd
                    .find_or_add(index, &base, &empty, order, module, coherent),
            );
        }
        args.sort_by_key(|vertex| -vertex.as_node().order());
        let limit = self.zbdd.settings.limit_order_value();
        let mut iter = args.into_iter();
        let mut result = iter.next().expect("Gate without arguments.");
        for arg in iter {
            result = self.zbdd.apply(connective, &result, &arg, limit);
        }
        self.zbdd.clear_tables();
        result
    }

    /// The index of the next gate to expand in the intermediate cut sets,
    /// or 0 when only variables and modules remain.
    pub fn next_gate(&self) -> i32 {
        match &**self.zbdd.root() {
            Vertex::Node(node) => {
                let bound = self
                    .zbdd
                    .gate_index_bound
                    .expect("The container always bounds gate indices.");
                if node.index() > bound && !node.module() {
                    node.index()
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Extracts (removes) the intermediate cut sets containing a gate,
    /// stripping the gate literal itself.
    pub fn extract_intermediate_cut_sets(&mut self, index: i32) -> VertexPtr {
        debug_assert!(index != 0 && index == self.next_gate());
        debug!("Extracting cut sets for G{}", index);
        let (high, low) = {
            let node = self.zbdd.root().as_node();
            (node.high().clone(), node.low().clone())
        };
        self.zbdd.set_root(low);
        high
    }

    /// Multiplies a gate's own cut sets into the extracted sets.
    pub fn expand_gate(&mut self, gate_zbdd: &VertexPtr, cut_sets: &VertexPtr) -> VertexPtr {
        let limit = self.zbdd.settings.limit_order_value();
        self.zbdd.apply(Connective::And, gate_zbdd, cut_sets, limit)
    }

    /// Merges a set of cut sets into the container.
    pub fn merge(&mut self, vertex: &VertexPtr) {
        let limit = self.zbdd.settings.limit_order_value();
        let root = self.zbdd.root().clone();
        let merged = self.zbdd.apply(Connective::Or, &root, vertex, limit);
        self.zbdd.set_root(merged);
        self.zbdd.clear_tables();
    }

    /// Minimizes the cut sets in the container.
    pub fn minimize(&mut self) {
        let root = self.zbdd.root().clone();
        let minimal = self.zbdd.minimize(&root);
        self.zbdd.set_root(minimal);
    }

    /// Eliminates all complement literals from the cut sets.
    pub fn eliminate_complements(&mut self) {
        let mut results = FxHashMap::default();
        let root = self.zbdd.root().clone();
        let processed = self.zbdd.eliminate_complements_from(&root, &mut results);
        self.zbdd.set_root(processed);
    }

    /// Removes constant modules from the cut sets.
    pub fn eliminate_constant_modules(&mut self) {
        self.zbdd.eliminate_constant_modules();
    }

    /// Gathers module proxies with their coherence and order cut-offs.
    pub fn gather_modules(&mut self) -> std::collections::BTreeMap<i32, (bool, i32)> {
        debug_assert!(
            self.zbdd.modules().is_empty(),
            "Unexpected call with defined modules."
        );
        let mut modules = std::collections::BTreeMap::new();
        let root = self.zbdd.root().clone();
        self.zbdd.gather_modules(&root, 0, &mut modules);
        modules
    }

    /// Joins a fully processed module container.
    pub fn join_module(&mut self, index: i32, container: CutSetContainer) {
        self.zbdd.join_module(index, container.zbdd);
    }

    /// Joins a fully processed plain diagram as a module.
    pub fn join_module_zbdd(&mut self, index: i32, container: Zbdd) {
        self.zbdd.join_module(index, container);
    }

    /// The finished container as a plain diagram.
    pub fn into_zbdd(self) -> Zbdd {
        self.zbdd
    }

    /// Read access for assertions and logging.
    pub fn as_zbdd(&self) -> &Zbdd {
        &self.zbdd
    }
}
