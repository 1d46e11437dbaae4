//! Graph rewrite passes preparing a PDAG for diagram construction
//!
//! The pipeline lowers the graph to AND/OR form, optionally pushes
//! complements down to the variables, coalesces same-logic gates, marks
//! coherence, detects modules by visit-time intervals, and assigns the
//! topological variable ordering used by the decision diagrams.

use log::debug;
use rustc_hash::FxHashMap;

use super::{traverse_gates, Connective, Gate, GatePtr, NodeArg, Pdag, VariablePtr};

/// Runs preprocessing passes over a PDAG.
pub struct Preprocessor<'a> {
    graph: &'a Pdag,
}

impl<'a> Preprocessor<'a> {
    /// Binds the preprocessor to a graph.
    pub fn new(graph: &'a Pdag) -> Self {
        Preprocessor { graph }
    }

    /// Runs the full pipeline.
    ///
    /// With `normal_form` set, complements of gates are propagated down to
    /// the variables so that every gate argument edge is positive. The
    /// BDD backend keeps complement edges and skips that pass.
    pub fn run(&mut self, normal_form: bool) {
        debug!("Propagating constants and removing pass-through gates");
        self.graph.remove_null_gates();
        if self.graph.check_trivial() {
            return;
        }
        debug!("Normalizing gates");
        self.normalize_gates();
        self.graph.remove_null_gates();
        if self.graph.check_trivial() {
            return;
        }
        if normal_form {
            debug!("Propagating complements");
            self.propagate_complements();
            self.graph.remove_null_gates();
            if self.graph.check_trivial() {
                return;
            }
        }
        debug!("Coalescing gates");
        loop {
            let changed = self.join_gates(&self.graph.root());
            self.graph.clear_gate_marks();
            self.graph.remove_null_gates();
            if !changed {
                break;
            }
            if self.graph.root().borrow().connective() == Connective::Null
                && self.graph.check_trivial()
            {
                return;
            }
        }
        if self.graph.check_trivial() {
            return;
        }
        debug!("Detecting modules");
        self.detect_modules();
        // Coherence marking covers the module gates introduced by detection.
        self.mark_coherence();
        self.assign_order();
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Rewrites high-level connectives into AND/OR form.
    ///
    /// NOT/NAND/NOR become sign edges, XOR expands into its two-product
    /// form, and at-least gates expand recursively.
    pub fn normalize_gates(&mut self) {
        let root = self.graph.root();
        match root.borrow().connective() {
            Connective::Nor | Connective::Nand | Connective::Not => {
                self.graph.set_complement(!self.graph.complement());
            }
            _ => {}
        }
        self.notify_parents_of_negative_gates(&root);
        self.graph.clear_gate_marks();
        self.normalize_gate(&root);
        self.graph.clear_gate_marks();
        self.graph.set_normal(true);
    }

    /// Moves the negation of NOT/NAND/NOR child gates onto the parent edge.
    fn notify_parents_of_negative_gates(&self, gate: &GatePtr) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let children: Vec<(i32, GatePtr)> = gate.borrow().gate_args().to_vec();
        let mut to_negate = Vec::new();
        for (index, child) in &children {
            self.notify_parents_of_negative_gates(child);
            match child.borrow().connective() {
                Connective::Nor | Connective::Nand | Connective::Not => to_negate.push(*index),
                _ => {}
            }
        }
        for index in to_negate {
            Gate::negate_arg(gate, index);
        }
    }

    /// Normalizes one gate after its children.
    fn normalize_gate(&self, gate: &GatePtr) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let children: Vec<GatePtr> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(_, child)| child.clone())
            .collect();
        for child in &children {
            self.normalize_gate(child);
        }
        let connective = gate.borrow().connective();
        match connective {
            Connective::Not => gate.borrow_mut().set_connective(Connective::Null),
            Connective::Nor => gate.borrow_mut().set_connective(Connective::Or),
            Connective::Nand => gate.borrow_mut().set_connective(Connective::And),
            Connective::Xor => self.normalize_xor_gate(gate),
            Connective::Atleast => self.normalize_atleast_gate(gate),
            Connective::And | Connective::Or | Connective::Null => {}
        }
    }

    /// `a ^ b = a & ~b | ~a & b`
    fn normalize_xor_gate(&self, gate: &GatePtr) {
        debug_assert_eq!(gate.borrow().args().len(), 2);
        let graph = self.graph;
        let gate_one = Gate::new(Connective::And, graph);
        let gate_two = Gate::new(Connective::And, graph);

        let args: Vec<i32> = gate.borrow().args().iter().copied().collect();
        gate.borrow_mut().set_connective(Connective::Or);
        Gate::share_arg(gate, graph, args[0], &gate_one);
        Gate::share_arg(gate, graph, args[0], &gate_two);
        Gate::negate_arg(&gate_two, args[0]);

        Gate::share_arg(gate, graph, args[1], &gate_one);
        Gate::negate_arg(&gate_one, args[1]);
        Gate::share_arg(gate, graph, args[1], &gate_two);

        Gate::erase_args(gate);
        let index_one = gate_one.borrow().index();
        Gate::add_arg(gate, graph, index_one, NodeArg::Gate(gate_one));
        let index_two = gate_two.borrow().index();
        Gate::add_arg(gate, graph, index_two, NodeArg::Gate(gate_two));
    }

    /// `@(k, [args]) = x & @(k-1, [rest]) | @(k, [rest])`
    fn normalize_atleast_gate(&self, gate: &GatePtr) {
        debug_assert_eq!(gate.borrow().connective(), Connective::Atleast);
        let (min_number, num_args) = {
            let g = gate.borrow();
            (g.min_number(), g.args().len())
        };
        debug_assert!(min_number > 0);
        debug_assert!(num_args > 1);
        if num_args == min_number as usize {
            gate.borrow_mut().set_connective(Connective::And);
            return;
        }
        if min_number == 1 {
            gate.borrow_mut().set_connective(Connective::Or);
            return;
        }
        let graph = self.graph;
        let args: Vec<i32> = gate.borrow().args().iter().copied().collect();

        let first_arg = Gate::new(Connective::And, graph);
        Gate::share_arg(gate, graph, args[0], &first_arg);

        let grand_arg = Gate::new(Connective::Atleast, graph);
        grand_arg.borrow_mut().set_min_number(min_number - 1);
        let grand_index = grand_arg.borrow().index();
        Gate::add_arg(&first_arg, graph, grand_index, NodeArg::Gate(grand_arg.clone()));

        let second_arg = Gate::new(Connective::Atleast, graph);
        second_arg.borrow_mut().set_min_number(min_number);

        for &index in &args[1..] {
            Gate::share_arg(gate, graph, index, &grand_arg);
            Gate::share_arg(gate, graph, index, &second_arg);
        }

        gate.borrow_mut().set_connective(Connective::Or);
        Gate::erase_args(gate);
        let first_index = first_arg.borrow().index();
        Gate::add_arg(gate, graph, first_index, NodeArg::Gate(first_arg.clone()));
        let second_index = second_arg.borrow().index();
        Gate::add_arg(gate, graph, second_index, NodeArg::Gate(second_arg.clone()));

        self.normalize_atleast_gate(&grand_arg);
        self.normalize_atleast_gate(&second_arg);
    }

    // ------------------------------------------------------------------
    // Complement propagation
    // ------------------------------------------------------------------

    /// Creates complement twins for gates referenced through complement
    /// edges so that only variables carry signs afterwards.
    pub fn propagate_complements(&mut self) {
        if self.graph.complement() {
            // The graph complement folds into the root by De Morgan.
            let root = self.graph.root();
            let connective = root.borrow().connective();
            match connective {
                Connective::Or => root.borrow_mut().set_connective(Connective::And),
                Connective::And => root.borrow_mut().set_connective(Connective::Or),
                Connective::Null => {}
                _ => unreachable!("Normalization leaves only AND/OR/NULL."),
            }
            if connective != Connective::Null {
                Gate::negate_args(&root);
                self.graph.set_complement(false);
            }
        }
        let mut complements = FxHashMap::default();
        self.propagate_complements_from(&self.graph.root(), &mut complements);
        self.graph.clear_gate_marks();
    }

    fn propagate_complements_from(
        &self,
        gate: &GatePtr,
        complements: &mut FxHashMap<i32, GatePtr>,
    ) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let children: Vec<(i32, GatePtr)> = gate.borrow().gate_args().to_vec();
        let mut to_swap = Vec::new();
        for (signed_index, child) in &children {
            let mut next = child.clone();
            if *signed_index < 0 {
                to_swap.push(*signed_index);
                let child_index = child.borrow().index();
                if let Some(twin) = complements.get(&child_index) {
                    next = twin.clone();
                } else {
                    let connective = child.borrow().connective();
                    debug_assert!(
                        connective == Connective::And || connective == Connective::Or,
                        "Only normalized gates can be complemented."
                    );
                    let flipped = if connective == Connective::Or {
                        Connective::And
                    } else {
                        Connective::Or
                    };
                    let twin = Gate::clone_gate(child, self.graph);
                    twin.borrow_mut().set_connective(flipped);
                    Gate::negate_args(&twin);
                    complements.insert(child_index, twin.clone());
                    next = twin;
                }
            }
            self.propagate_complements_from(&next, complements);
        }
        for signed_index in to_swap {
            debug_assert!(signed_index < 0);
            let twin = complements
                .get(&-signed_index)
                .expect("Twin registered above.")
                .clone();
            Gate::erase_arg(gate, signed_index);
            let twin_index = twin.borrow().index();
            Gate::add_arg(gate, self.graph, twin_index, NodeArg::Gate(twin));
        }
    }

    // ------------------------------------------------------------------
    // Coalescing
    // ------------------------------------------------------------------

    /// Joins positive child gates of the same logic into their parents.
    fn join_gates(&self, gate: &GatePtr) -> bool {
        if gate.borrow().mark() {
            return false;
        }
        gate.borrow_mut().set_mark(true);
        let parent_type = gate.borrow().connective();
        let children: Vec<(i32, GatePtr)> = gate.borrow().gate_args().to_vec();
        let mut changed = false;
        let mut to_join = Vec::new();
        for (signed_index, child) in &children {
            changed |= self.join_gates(child);
            if *signed_index < 0 {
                continue;
            }
            if child.borrow().module() {
                continue;
            }
            let child_type = child.borrow().connective();
            let joinable = matches!(
                (parent_type, child_type),
                (Connective::And, Connective::And)
                    | (Connective::Nand, Connective::And)
                    | (Connective::Or, Connective::Or)
                    | (Connective::Nor, Connective::Or)
            );
            // Shared children stay: coalescing them duplicates work.
            if joinable && child.borrow().base().parents_len() == 1 {
                to_join.push(child.clone());
            }
        }
        changed |= !to_join.is_empty();
        for child in to_join {
            Gate::coalesce_gate(gate, self.graph, &child);
            if gate.borrow().constant() {
                return true;
            }
        }
        changed
    }

    // ------------------------------------------------------------------
    // Coherence
    // ------------------------------------------------------------------

    /// Marks each gate coherent iff its sub-graph carries no complements.
    fn mark_coherence(&mut self) {
        let mut memo = FxHashMap::default();
        let root = self.graph.root();
        let root_coherent = self.coherence_of(&root, &mut memo);
        self.graph
            .set_coherent(root_coherent && !self.graph.complement());
    }

    fn coherence_of(&self, gate: &GatePtr, memo: &mut FxHashMap<i32, bool>) -> bool {
        let index = gate.borrow().index();
        if let Some(&coherent) = memo.get(&index) {
            return coherent;
        }
        let mut coherent = matches!(
            gate.borrow().connective(),
            Connective::And | Connective::Or | Connective::Null
        );
        if coherent {
            coherent = gate.borrow().args().iter().all(|&i| i > 0);
        }
        if coherent {
            let children: Vec<GatePtr> = gate
                .borrow()
                .gate_args()
                .iter()
                .map(|(_, child)| child.clone())
                .collect();
            for child in &children {
                if !self.coherence_of(child, memo) {
                    coherent = false;
                    break;
                }
            }
        }
        gate.borrow_mut().set_coherent(coherent);
        memo.insert(index, coherent);
        coherent
    }

    // ------------------------------------------------------------------
    // Module detection
    // ------------------------------------------------------------------

    /// Finds original modules with a two-pass DFS over visit times.
    pub fn detect_modules(&mut self) {
        self.graph.clear_node_visits();
        let root = self.graph.root();
        let time = self.assign_timing(0, &root);
        self.graph.clear_gate_marks();
        debug!("Timings are assigned to nodes; total time {}", time);

        let mut visited_gates = FxHashMap::default();
        self.find_modules(&root, &mut visited_gates);
        debug_assert!(root.borrow().module(), "The root is a module by definition.");
        self.graph.clear_gate_marks();
    }

    /// First pass: depth-first visit times for every node.
    fn assign_timing(&self, time: i32, gate: &GatePtr) -> i32 {
        let mut time = time + 1;
        if gate.borrow().base().visit(time) {
            return time;
        }
        debug_assert!(!gate.borrow().constant(), "Unexpected constant argument.");
        let (children, variables) = {
            let g = gate.borrow();
            (
                g.gate_args().iter().map(|(_, c)| c.clone()).collect::<Vec<_>>(),
                g.variable_args().iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            )
        };
        for child in &children {
            time = self.assign_timing(time, child);
        }
        for var in &variables {
            time += 1;
            var.visit_leaf(time);
        }
        time += 1;
        let re_visited = gate.borrow().base().visit(time);
        debug_assert!(!re_visited, "No cyclic visiting.");
        time
    }

    /// Second pass: a gate is a module iff every descendant's visit
    /// interval nests inside the gate's own [enter, exit] interval.
    fn find_modules(
        &self,
        gate: &GatePtr,
        visited_gates: &mut FxHashMap<i32, (i32, i32)>,
    ) {
        let gate_index = gate.borrow().index();
        if visited_gates.contains_key(&gate_index) {
            return;
        }
        let enter_time = gate.borrow().base().enter_time();
        let exit_time = gate.borrow().base().exit_time();
        let mut min_time = enter_time;
        let mut max_time = exit_time;

        let mut non_shared_args: Vec<i32> = Vec::new();
        let mut modular_args: Vec<i32> = Vec::new();
        let mut non_modular_args: Vec<i32> = Vec::new();

        let children: Vec<(i32, GatePtr)> = gate.borrow().gate_args().to_vec();
        for (signed_index, child) in &children {
            self.find_modules(child, visited_gates);
            let child_index = child.borrow().index();
            let (min, max) = *visited_gates
                .get(&child_index)
                .expect("Child processed above.");
            if child.borrow().module() && !child.borrow().base().revisited() {
                non_shared_args.push(*signed_index);
                continue;
            }
            debug_assert!(min > 0 && max > 0);
            if min > enter_time && max < exit_time {
                modular_args.push(*signed_index);
            } else {
                non_modular_args.push(*signed_index);
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }
        let variables: Vec<(i32, VariablePtr)> = gate.borrow().variable_args().to_vec();
        for (signed_index, var) in &variables {
            let min = var.enter_time();
            let max = var.exit_time();
            debug_assert!(min > 0 && max > 0);
            if min == max {
                debug_assert!(min > enter_time && max < exit_time);
                non_shared_args.push(*signed_index);
                continue;
            }
            if min > enter_time && max < exit_time {
                modular_args.push(*signed_index);
            } else {
                non_modular_args.push(*signed_index);
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        if min_time == enter_time && max_time == exit_time {
            debug!("Found original module: G{}", gate_index);
            gate.borrow_mut().set_module(true);
        }
        max_time = max_time.max(gate.borrow().base().last_visit());
        gate.borrow_mut().set_times(min_time, max_time);
        visited_gates.insert(gate_index, (min_time, max_time));

        match gate.borrow().connective() {
            Connective::And | Connective::Or | Connective::Nand | Connective::Nor => {}
            _ => return,
        }
        self.create_new_module(gate, &non_shared_args);
        self.filter_modular_args(visited_gates, &mut modular_args, &mut non_modular_args);
        self.create_new_module(gate, &modular_args);
    }

    /// Moves modular arguments overlapping any non-modular argument's
    /// interval into the non-modular group, until stable.
    ///
    /// Interval overlap means shared descendants.
    fn filter_modular_args(
        &self,
        visited_gates: &FxHashMap<i32, (i32, i32)>,
        modular_args: &mut Vec<i32>,
        non_modular_args: &mut Vec<i32>,
    ) {
        loop {
            if modular_args.is_empty() || non_modular_args.is_empty() {
                return;
            }
            let mut moved = false;
            let mut index = 0;
            while index < modular_args.len() {
                let candidate = modular_args[index];
                let (min, max) = self.interval_by_index(candidate, visited_gates);
                let overlaps = non_modular_args.iter().any(|&other| {
                    let (lower, upper) = self.interval_by_index(other, visited_gates);
                    min.max(lower) <= max.min(upper)
                });
                if overlaps {
                    non_modular_args.push(candidate);
                    modular_args.swap_remove(index);
                    moved = true;
                } else {
                    index += 1;
                }
            }
            if !moved {
                return;
            }
        }
    }

    fn interval_by_index(
        &self,
        signed_index: i32,
        visited_gates: &FxHashMap<i32, (i32, i32)>,
    ) -> (i32, i32) {
        let index = signed_index.abs();
        if let Some(&bounds) = visited_gates.get(&index) {
            bounds
        } else {
            let var = self.graph.variable(index);
            (var.enter_time(), var.exit_time())
        }
    }

    /// Groups the given arguments of a gate into a new module gate.
    fn create_new_module(&self, gate: &GatePtr, args: &[i32]) -> Option<GatePtr> {
        if args.len() < 2 {
            return None;
        }
        if args.len() == gate.borrow().args().len() {
            debug_assert!(gate.borrow().module());
            return None;
        }
        let connective = match gate.borrow().connective() {
            Connective::And | Connective::Nand => Connective::And,
            Connective::Or | Connective::Nor => Connective::Or,
            _ => return None,
        };
        let module = Gate::new(connective, self.graph);
        module.borrow_mut().set_module(true);
        for &index in args {
            Gate::transfer_arg(gate, self.graph, index, &module);
        }
        let module_index = module.borrow().index();
        Gate::add_arg(gate, self.graph, module_index, NodeArg::Gate(module.clone()));
        debug_assert!(gate.borrow().args().len() > 1);
        debug!(
            "Created a new module G{} for G{} with {} arguments",
            module_index,
            gate.borrow().index(),
            args.len()
        );
        Some(module)
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Assigns topological orders to variables and gates.
    ///
    /// A post-order DFS assigns variables their order on first encounter
    /// and gates after all their descendants; arguments are visited in
    /// decreasing occurrence order so high-fan-out variables sit near the
    /// root of the diagrams.
    pub fn assign_order(&mut self) {
        self.graph.clear_node_orders();
        self.graph.clear_node_counts();
        let root = self.graph.root();
        traverse_gates(&root, true, &mut |gate| {
            let g = gate.borrow();
            for (signed_index, child) in g.gate_args() {
                child.borrow().base().add_count(*signed_index > 0);
            }
            for (signed_index, var) in g.variable_args() {
                var.add_count(*signed_index > 0);
            }
        });
        self.graph.clear_gate_marks();
        let order = self.topological_order(&root, 0);
        debug!("Topological order assigned up to {}", order);
    }

    fn topological_order(&self, gate: &GatePtr, mut order: i32) -> i32 {
        if gate.borrow().base().order() != 0 {
            return order;
        }
        let (mut children, mut variables) = {
            let g = gate.borrow();
            (
                g.gate_args().iter().map(|(_, c)| c.clone()).collect::<Vec<_>>(),
                g.variable_args().iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            )
        };
        let weight = |gate: &GatePtr| {
            let base = gate.borrow().base().pos_count() + gate.borrow().base().neg_count();
            -base
        };
        children.sort_by_key(weight);
        variables.sort_by_key(|var| -(var.pos_count() + var.neg_count()));
        for child in &children {
            order = self.topological_order(child, order);
        }
        for var in &variables {
            if var.order() == 0 {
                order += 1;
                var.set_order(order);
            }
        }
        order += 1;
        gate.borrow().base().set_order(order);
        order
    }
}
