//! MOCUS-style cut set generation by gate expansion
//!
//! An alternative to the BDD pipeline for very large graphs: each module
//! gate gets a [`CutSetContainer`] seeded with the module's root gate.
//! While a non-module gate tops the container, its intermediate cut sets
//! are extracted, the gate's own cut sets are multiplied in, and the result
//! is merged back. Sub-modules are analyzed recursively with tightened
//! order cut-offs and composed bottom-up.
//!
//! The graph must be normalized, complement-free on gate edges, and
//! variable-ordered.

use log::debug;
use rustc_hash::FxHashMap;

use crate::pdag::{GatePtr, Pdag, VARIABLE_START_INDEX};
use crate::settings::Settings;
use crate::zbdd::cutset::CutSetContainer;
use crate::zbdd::{Products, Zbdd};


/// MOCUS driver producing minimal cut sets from a normalized PDAG.
pub struct Mocus<'a> {
    graph: &'a Pdag,
    settings: Settings,
    zbdd: Option<Zbdd>,
}

impl<'a> Mocus<'a> {
    /// Prepares the driver for a preprocessed graph.
    pub fn new(graph: &'a Pdag, settings: &Settings) -> Self {
        debug_assert!(!graph.complement(), "Complements must be propagated.");
        Mocus {
            graph,
            settings: settings.clone(),
            zbdd: None,
        }
    }

    /// Generates the minimal cut sets.
    pub fn analyze(&mut self) {
        if self.graph.is_trivial() {
            debug!("The graph is trivial for MOCUS");
            let mut zbdd = Zbdd::from_pdag(self.graph, &self.settings);
            zbdd.analyze();
            self.zbdd = Some(zbdd);
            return;
        }
        let root = self.graph.root();
        let settings = self.settings.clone();
        let container = self.analyze_module(&root, &settings);
        let mut zbdd = container.into_zbdd();
        zbdd.analyze();
        self.zbdd = Some(zbdd);
    }

    /// The products generated by the analysis.
    pub fn products(&self) -> Products {
        self.container().products()
    }

    /// The underlying product diagram.
    pub fn container(&self) -> &Zbdd {
        self.zbdd.as_ref().expect("Analysis is not done.")
    }

    /// Runs the expansion loop on one module gate.
    fn analyze_module(&self, gate: &GatePtr, settings: &Settings) -> CutSetContainer {
        debug_assert!(gate.borrow().module(), "Expected only module gates.");
        let module_index = gate.borrow().index();
        debug!("Finding cut sets from module: G{}", module_index);

        let mut known_gates: FxHashMap<i32, GatePtr> = FxHashMap::default();
        let add_gates = |known: &mut FxHashMap<i32, GatePtr>, gate: &GatePtr| {
            for (signed_index, child) in gate.borrow().gate_args() {
                known.insert(signed_index.abs(), child.clone());
            }
        };
        add_gates(&mut known_gates, gate);

        let variable_bound = VARIABLE_START_INDEX + self.graph.num_variables() as i32 - 1;
        let index_ceiling = self.graph.node_index_bound();
        let mut container =
            CutSetContainer::new(settings, module_index, variable_bound, index_ceiling);
        let seed = container.convert_gate(gate);
        container.merge(&seed);

        loop {
            let next_index = container.next_gate();
            if next_index == 0 {
                break;
            }
            debug!("Expanding gate G{}", next_index);
            let next_gate = known_gates
                .get(&next_index)
                .cloned()
                .expect("Expanded gates are registered by their parents.");
            add_gates(&mut known_gates, &next_gate);

            let gate_sets = container.convert_gate(&next_gate);
            let intermediate = container.extract_intermediate_cut_sets(next_index);
            let expanded = container.expand_gate(&gate_sets, &intermediate);
            container.merge(&expanded);
        }
        container.minimize();
        if !gate.borrow().coherent() {
            container.eliminate_complements();
            container.minimize();
        }
        for (index, (coherent, limit)) in container.gather_modules() {
            debug_assert!(index > 0, "No complement modules are expected.");
            debug_assert!(limit >= 0, "Order cut-off is not strict.");
            if limit == 0 && coherent {
                // Unity is impossible: the module cannot contribute.
                let empty =
                    CutSetContainer::new(settings, index, variable_bound, index_ceiling);
                container.join_module(index, empty);
                continue;
            }
            let module_gate = known_gates
                .get(&index)
                .cloned()
                .expect("Module gates are registered by their parents.");
            let adjusted = settings.adjust_limit_order(limit);
            container.join_module(index, self.analyze_module(&module_gate, &adjusted));
        }
        container.eliminate_constant_modules();
        container.minimize();
        container
    }
}
