//! Zero-suppressed binary decision diagrams for product families
//!
//! A ZBDD vertex encodes the family `(literal · high) ∪ low` where the
//! literal is the vertex variable in positive or negated form (the sign of
//! the index). Two terminals exist: Base, the family containing only the
//! empty product, and Empty, the empty family. The zero-suppression rule
//! forbids `high = Empty`, so every stored path contributes a product.
//!
//! The engine hosts subsume-based minimization, size-order truncation,
//! conversion from BDDs (minimal cut sets and prime implicants) and from
//! normalized PDAGs, complement and constant-module elimination, and
//! modular composition through proxy vertices with attached sub-diagrams.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::bdd::{Bdd, Function as BddFunction, Ite, VertexPtr as BddVertexPtr};
use crate::pdag::{Connective, GatePtr, Pdag};
use crate::settings::Settings;
use crate::tables::{PairTable, TripletTable, UniqueTable};

pub mod cutset;
#[cfg(test)]
mod tests;

/// Shared vertices of the ZBDD.
pub type VertexPtr = Rc<Vertex>;

/// A vertex of the ZBDD.
pub enum Vertex {
    /// The Base terminal: the family of the single empty product (id 1).
    Base,
    /// The Empty terminal: the empty family (id 0).
    Empty,
    /// A non-terminal set node.
    Node(SetNode),
}

impl Vertex {
    /// The unique id of the set graph rooted at this vertex.
    pub fn id(&self) -> i32 {
        match self {
            Vertex::Base => 1,
            Vertex::Empty => 0,
            Vertex::Node(node) => node.id,
        }
    }

    /// True for the Base and Empty terminals.
    pub fn terminal(&self) -> bool {
        !matches!(self, Vertex::Node(_))
    }

    /// The terminal interpretation: true for Base, false for Empty.
    pub fn base_value(&self) -> bool {
        debug_assert!(self.terminal());
        matches!(self, Vertex::Base)
    }

    /// The set-node payload of a non-terminal vertex.
    ///
    /// Panics on terminals; callers must check first.
    pub fn as_node(&self) -> &SetNode {
        match self {
            Vertex::Node(node) => node,
            _ => panic!("Terminal ZBDD vertex has no set-node data."),
        }
    }
}

/// Non-terminal ZBDD node.
///
/// Complement literals carry negative indices; a negated literal shares the
/// order of its positive sibling and sorts after it.
pub struct SetNode {
    index: i32,
    order: i32,
    id: i32,
    module: bool,
    coherent: bool,
    max_set_order: i32,
    minimal: Cell<bool>,
    mark: Cell<bool>,
    count: Cell<i64>,
    high: VertexPtr,
    low: VertexPtr,
}

impl SetNode {
    /// The signed variable (or module gate) index of this node.
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The ordering rank of the node variable.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// True if this node proxies a module diagram.
    pub fn module(&self) -> bool {
        self.module
    }

    /// True if the proxied module is coherent.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// The size of the largest product in the family of this node.
    pub fn max_set_order(&self) -> i32 {
        self.max_set_order
    }

    /// True if no product in the family contains another.
    pub fn minimal(&self) -> bool {
        self.minimal.get()
    }

    /// The products that include the node literal, without the literal
    /// itself.
    pub fn high(&self) -> &VertexPtr {
        &self.high
    }

    /// The products that do not include the node literal.
    pub fn low(&self) -> &VertexPtr {
        &self.low
    }

    /// The general-purpose count slot used by enumeration.
    pub fn count(&self) -> i64 {
        self.count.get()
    }
}

/// Zero-suppressed BDD hosting a family of products.
pub struct Zbdd {
    settings: Settings,
    root: VertexPtr,
    coherent: bool,
    module_index: i32,
    /// Exclusive lower bound for gate indices in MOCUS containers;
    /// `None` outside containers, where module flags identify gates.
    gate_index_bound: Option<i32>,
    base: VertexPtr,
    empty: VertexPtr,
    unique_table: UniqueTable<Vertex>,
    and_table: TripletTable<VertexPtr>,
    or_table: TripletTable<VertexPtr>,
    minimal_results: FxHashMap<i32, VertexPtr>,
    subsume_table: PairTable<VertexPtr>,
    prune_results: PairTable<VertexPtr>,
    modules: BTreeMap<i32, Zbdd>,
    set_id: i32,
}

impl Zbdd {
    /// The common initialization of an empty diagram.
    fn new_base(settings: &Settings, coherent: bool, module_index: i32) -> Zbdd {
        let base: VertexPtr = Rc::new(Vertex::Base);
        let empty: VertexPtr = Rc::new(Vertex::Empty);
        Zbdd {
            settings: settings.clone(),
            root: empty.clone(),
            coherent,
            module_index,
            gate_index_bound: None,
            base,
            empty,
            unique_table: UniqueTable::new(),
            and_table: TripletTable::default(),
            or_table: TripletTable::default(),
            minimal_results: FxHashMap::default(),
            subsume_table: PairTable::default(),
            prune_results: PairTable::default(),
            modules: BTreeMap::new(),
            set_id: 2,
        }
    }

    /// Converts a reduced ordered BDD into a ZBDD of its products.
    ///
    /// The BDD is mutable because prime-implicant extraction computes
    /// consensus functions through it; its structure is preserved.
    pub fn from_bdd(bdd: &mut Bdd, settings: &Settings) -> Zbdd {
        let root = bdd.root().clone();
        let coherent = bdd.coherent();
        Zbdd::from_module_function(&root, coherent, bdd, settings, 0)
    }

    /// Converts a modular BDD function into a ZBDD, recursing into the
    /// modules referenced by proxy vertices.
    fn from_module_function(
        function: &BddFunction,
        coherent: bool,
        bdd: &mut Bdd,
        settings: &Settings,
        module_index: i32,
    ) -> Zbdd {
        debug!("Creating ZBDD from BDD: G{}", module_index);
        let mut zbdd = Zbdd::new_base(settings, coherent, module_index);
        let mut ites = PairTable::default();
        let converted = zbdd.convert_bdd(
            &function.vertex,
            function.complement,
            bdd,
            settings.limit_order_value(),
            &mut ites,
        );
        zbdd.root = zbdd.minimize(&converted);
        debug_assert!(zbdd.root.terminal() || zbdd.root.as_node().minimal());
        zbdd.log_properties();

        let mut sub_modules: BTreeMap<i32, (bool, i32)> = BTreeMap::new();
        let root = zbdd.root.clone();
        zbdd.gather_modules(&root, 0, &mut sub_modules);
        for (index, (coherence, limit)) in sub_modules {
            debug_assert!(!zbdd.modules.contains_key(&index), "Recalculating modules.");
            debug_assert!(limit >= 0, "Order cut-off is not strict.");
            let module_coherence = coherence && index > 0;
            if limit == 0 && module_coherence {
                // Unity is impossible: the module contributes nothing.
                zbdd.join_module(index, Zbdd::new_base(settings, false, index));
                continue;
            }
            let sub = bdd
                .modules()
                .get(&index.abs())
                .cloned()
                .expect("Unregistered module in the host BDD.");
            debug_assert!(!sub.vertex.terminal(), "Unexpected BDD terminal vertex.");
            let sub_function = BddFunction {
                complement: sub.complement ^ (index < 0),
                vertex: sub.vertex,
            };
            let adjusted = settings.adjust_limit_order(limit);
            zbdd.join_module(
                index,
                Zbdd::from_module_function(&sub_function, module_coherence, bdd, &adjusted, index),
            );
        }
        if zbdd.modules.values().any(|module| module.root.terminal()) {
            debug!("Eliminating constant modules from ZBDD");
            let mut results = FxHashMap::default();
            let root = zbdd.root.clone();
            zbdd.root = zbdd.eliminate_constant_modules_from(&root, &mut results);
        }
        zbdd
    }

    /// Builds the products of a normalized PDAG without a BDD.
    ///
    /// The graph must be in negation normal form with variable ordering.
    pub fn from_pdag(graph: &Pdag, settings: &Settings) -> Zbdd {
        debug_assert!(!graph.complement(), "Complements must be propagated.");
        debug_assert!(
            !settings.prime_implicants_value(),
            "Prime implicants require the BDD algorithm."
        );
        if graph.is_trivial() {
            let root_gate = graph.root();
            let r = root_gate.borrow();
            let mut zbdd = Zbdd::new_base(settings, graph.coherent(), r.index());
            debug_assert_eq!(r.args().len(), 1);
            debug_assert!(r.gate_args().is_empty());
            let child = *r.args().iter().next().expect("Trivial gate argument.");
            if r.constant() {
                zbdd.root = if child < 0 {
                    zbdd.empty.clone()
                } else {
                    zbdd.base.clone()
                };
            } else if child < 0 {
                // A lone complement literal is approximated away in
                // minimal-cut-set semantics.
                zbdd.root = zbdd.base.clone();
            } else {
                let (_, var) = &r.variable_args()[0];
                zbdd.root = zbdd.find_or_add(
                    var.index(),
                    &zbdd.base.clone(),
                    &zbdd.empty.clone(),
                    var.order(),
                    false,
                    false,
                );
            }
            return zbdd;
        }
        Zbdd::from_gate(&graph.root(), settings)
    }

    /// Converts a module gate of a normalized PDAG into a ZBDD.
    fn from_gate(gate: &GatePtr, settings: &Settings) -> Zbdd {
        let (coherent, index, constant, connective) = {
            let g = gate.borrow();
            (g.coherent(), g.index(), g.constant(), g.connective())
        };
        let mut zbdd = Zbdd::new_base(settings, coherent, index);
        if constant || connective == Connective::Null {
            return zbdd;
        }
        debug_assert!(gate.borrow().module(), "Only module gates are converted.");
        debug!("Converting module to ZBDD: G{}", index);
        let mut gates = FxHashMap::default();
        let mut module_gates = FxHashMap::default();
        let converted = zbdd.convert_graph(gate, &mut gates, &mut module_gates);
        zbdd.root = converted;
        if !zbdd.coherent {
            debug!("Eliminating complements from ZBDD");
            let mut results = FxHashMap::default();
            let root = zbdd.root.clone();
            zbdd.root = zbdd.eliminate_complements_from(&root, &mut results);
        }
        let root = zbdd.root.clone();
        zbdd.root = zbdd.minimize(&root);
        zbdd.log_properties();

        let mut sub_modules: BTreeMap<i32, (bool, i32)> = BTreeMap::new();
        let root = zbdd.root.clone();
        zbdd.gather_modules(&root, 0, &mut sub_modules);
        for (index, (coherence, limit)) in sub_modules {
            debug_assert!(index > 0, "No complement gates.");
            debug_assert!(!zbdd.modules.contains_key(&index), "Recalculating modules.");
            debug_assert!(limit >= 0, "Order cut-off is not strict.");
            if limit == 0 && coherence {
                zbdd.join_module(index, Zbdd::new_base(settings, false, index));
                continue;
            }
            let module_gate = module_gates
                .get(&index)
                .expect("Unregistered module gate.")
                .clone();
            let adjusted = settings.adjust_limit_order(limit);
            zbdd.join_module(index, Zbdd::from_gate(&module_gate, &adjusted));
        }
        zbdd.eliminate_constant_modules();
        zbdd
    }

    /// Minimizes the diagram, analyzes the modules, prunes to the order
    /// limit, and releases the working tables.
    pub fn analyze(&mut self) {
        debug_assert!(
            self.root.terminal()
                || self.root.as_node().max_set_order() <= self.settings.limit_order_value()
        );
        let root = self.root.clone();
        self.root = self.minimize(&root);
        debug_assert!(self.root.terminal() || self.root.as_node().minimal());
        for module in self.modules.values_mut() {
            module.analyze();
        }
        let limit = self.settings.limit_order_value();
        let root = self.root.clone();
        self.root = self.prune(&root, limit);
        self.freeze();
        debug!("G{} analysis done", self.module_index);
    }

    /// The root vertex of the diagram.
    pub fn root(&self) -> &VertexPtr {
        &self.root
    }

    pub(crate) fn set_root(&mut self, vertex: VertexPtr) {
        self.root = vertex;
    }

    /// Analysis settings of this diagram.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The fully processed module diagrams keyed by signed module index.
    pub fn modules(&self) -> &BTreeMap<i32, Zbdd> {
        &self.modules
    }

    /// True if the diagram holds no products.
    pub fn empty(&self) -> bool {
        matches!(&*self.root, Vertex::Empty)
    }

    /// True if the diagram is the Base (Unity) set.
    pub fn base(&self) -> bool {
        matches!(&*self.root, Vertex::Base)
    }

    /// Registers a fully processed module diagram.
    pub(crate) fn join_module(&mut self, index: i32, container: Zbdd) {
        debug_assert!(!self.modules.contains_key(&index));
        debug_assert!(container.root.terminal() || container.root.as_node().minimal());
        self.modules.insert(index, container);
    }

    fn log_properties(&mut self) {
        debug!("ZBDD nodes created: {}", self.set_id - 2);
        debug!("Unique table entries: {}", self.unique_table.len());
        self.clear_marks(&self.root.clone(), false);
        let nodes = self.count_set_nodes(&self.root.clone());
        self.clear_marks(&self.root.clone(), false);
        debug!("SetNodes in ZBDD: {}", nodes);
    }

    // ------------------------------------------------------------------
    // Vertex management
    // ------------------------------------------------------------------

    /// True if a node may collapse to Unity and must not consume order.
    fn may_be_unity_parts(&self, index: i32, module: bool, coherent: bool) -> bool {
        if self.settings.prime_implicants_value() {
            return false;
        }
        if index < 0 {
            return true; // Unity complement literals under cut sets.
        }
        let is_gate = match self.gate_index_bound {
            Some(bound) => index > bound,
            None => module,
        };
        // Non-modular gates can be implied by other gates in the product;
        // non-coherent gates contain complements approximated to Unity.
        if is_gate {
            return !module || !coherent;
        }
        false
    }

    fn may_be_unity(&self, node: &SetNode) -> bool {
        self.may_be_unity_parts(node.index, node.module, node.coherent)
    }

    /// Finds or creates a unique set node, computing its max set order.
    ///
    /// This function is not aware of reduction rules.
    fn find_or_add(
        &mut self,
        index: i32,
        high: &VertexPtr,
        low: &VertexPtr,
        order: i32,
        module: bool,
        coherent: bool,
    ) -> VertexPtr {
        debug_assert!(high.id() != low.id(), "Reduction failure.");
        debug_assert!(order > 0, "Improper order.");
        let key = (index, high.id(), low.id());
        if let Some(vertex) = self.unique_table.find(key) {
            return vertex;
        }
        let id = self.set_id;
        self.set_id += 1;
        let mut high_order = if high.terminal() {
            0
        } else {
            high.as_node().max_set_order()
        };
        if !self.may_be_unity_parts(index, module, coherent) {
            high_order += 1;
        }
        let low_order = if low.terminal() {
            0
        } else {
            low.as_node().max_set_order()
        };
        let vertex: VertexPtr = Rc::new(Vertex::Node(SetNode {
            index,
            order,
            id,
            module,
            coherent,
            max_set_order: high_order.max(low_order),
            minimal: Cell::new(false),
            mark: Cell::new(false),
            count: Cell::new(0),
            high: high.clone(),
            low: low.clone(),
        }));
        self.unique_table.insert(key, &vertex);
        vertex
    }

    /// Finds a replacement for an existing node with new branches.
    fn find_or_add_like(
        &mut self,
        node_vertex: &VertexPtr,
        high: &VertexPtr,
        low: &VertexPtr,
    ) -> VertexPtr {
        let node = node_vertex.as_node();
        if node.high.id() == high.id() && node.low.id() == low.id() {
            return node_vertex.clone();
        }
        self.find_or_add(node.index, high, low, node.order, node.module, node.coherent)
    }

    /// Reduced vertex for a prototype BDD ITE vertex: applies the
    /// zero-suppression and subsumption-by-base rules.
    fn reduced_from_ite(
        &mut self,
        ite: &Ite,
        complement: bool,
        high: &VertexPtr,
        low: &VertexPtr,
    ) -> VertexPtr {
        if high.id() == low.id() {
            return low.clone();
        }
        if high.terminal() && !high.base_value() {
            return low.clone();
        }
        if low.terminal() && low.base_value() {
            return low.clone();
        }
        debug_assert!(ite.index() > 0, "BDD indices are never negative.");
        let index = if complement { -ite.index() } else { ite.index() };
        self.find_or_add(index, high, low, ite.order(), ite.module(), ite.coherent())
    }

    /// Reduced vertex for a prototype set node.
    fn reduced_from_node(
        &mut self,
        node_vertex: &VertexPtr,
        high: &VertexPtr,
        low: &VertexPtr,
    ) -> VertexPtr {
        if high.id() == low.id() {
            return low.clone();
        }
        if high.terminal() && !high.base_value() {
            return low.clone();
        }
        if low.terminal() && low.base_value() {
            return low.clone();
        }
        self.find_or_add_like(node_vertex, high, low)
    }

    // ------------------------------------------------------------------
    // Conversion from BDD
    // ------------------------------------------------------------------

    fn convert_bdd(
        &mut self,
        vertex: &BddVertexPtr,
        complement: bool,
        bdd: &mut Bdd,
        limit_order: i32,
        ites: &mut PairTable<VertexPtr>,
    ) -> VertexPtr {
        if vertex.terminal() {
            return if complement {
                self.empty.clone()
            } else {
                self.base.clone()
            };
        }
        let key = (
            if complement { -vertex.id() } else { vertex.id() },
            limit_order,
        );
        if let Some(result) = ites.get(&key) {
            return result.clone();
        }
        let result = if !self.coherent && self.settings.prime_implicants_value() {
            self.convert_bdd_prime_implicants(vertex, complement, bdd, limit_order, ites)
        } else {
            self.convert_bdd_ite(vertex, complement, bdd, limit_order, ites)
        };
        debug_assert!(result.terminal() || result.as_node().max_set_order() <= limit_order);
        ites.insert(key, result.clone());
        result
    }

    /// Minimal-cut-set conversion of one BDD vertex.
    fn convert_bdd_ite(
        &mut self,
        vertex: &BddVertexPtr,
        complement: bool,
        bdd: &mut Bdd,
        limit_order: i32,
        ites: &mut PairTable<VertexPtr>,
    ) -> VertexPtr {
        let (module, coherent, high, low, complement_edge) = {
            let ite = vertex.as_ite();
            (
                ite.module(),
                ite.coherent(),
                ite.high().clone(),
                ite.low().clone(),
                ite.complement_edge(),
            )
        };
        if module && !coherent {
            // Non-coherent modules go through the consensus split so the
            // module literal can carry its complement.
            return self.convert_bdd_prime_implicants(vertex, complement, bdd, limit_order, ites);
        }
        let low = self.convert_bdd(&low, complement_edge ^ complement, bdd, limit_order, ites);
        if limit_order == 0 {
            // Cut-off on the product order.
            if low.terminal() {
                return low;
            }
            return self.empty.clone();
        }
        let high = self.convert_bdd(&high, complement, bdd, limit_order - 1, ites);
        let ite = vertex.as_ite();
        self.reduced_from_ite(ite, false, &high, &low)
    }

    /// Prime-implicant conversion: the three-way consensus split.
    fn convert_bdd_prime_implicants(
        &mut self,
        vertex: &BddVertexPtr,
        complement: bool,
        bdd: &mut Bdd,
        limit_order: i32,
        ites: &mut PairTable<VertexPtr>,
    ) -> VertexPtr {
        let common = bdd.consensus(vertex, complement);
        let consensus = self.convert_bdd(&common.vertex, common.complement, bdd, limit_order, ites);
        if limit_order == 0 {
            if consensus.terminal() {
                return consensus;
            }
            return self.empty.clone();
        }
        let (module, high_branch, low_branch, complement_edge) = {
            let ite = vertex.as_ite();
            (
                ite.module(),
                ite.high().clone(),
                ite.low().clone(),
                ite.complement_edge(),
            )
        };
        let mut sublimit = limit_order - 1; // Assumes a non-Unity element.
        if module && !self.settings.prime_implicants_value() {
            // Unity modules may happen with minimal cut sets.
            sublimit += 1;
        }
        let high = self.convert_bdd(&high_branch, complement, bdd, sublimit, ites);
        let low = self.convert_bdd(&low_branch, complement_edge ^ complement, bdd, sublimit, ites);
        let ite = vertex.as_ite();
        let negative = self.reduced_from_ite(ite, true, &low, &consensus);
        self.reduced_from_ite(ite, false, &high, &negative)
    }

    // ------------------------------------------------------------------
    // Conversion from PDAG
    // ------------------------------------------------------------------

    /// Transforms a normalized gate tree into a set graph bottom-up.
    ///
    /// Sub-module gates are proxied, collected, and left unprocessed.
    fn convert_graph(
        &mut self,
        gate: &GatePtr,
        gates: &mut FxHashMap<i32, (VertexPtr, usize)>,
        module_gates: &mut FxHashMap<i32, GatePtr>,
    ) -> VertexPtr {
        debug_assert!(!gate.borrow().constant(), "Unexpected constant gate.");
        let (gate_index, parents_len) = {
            let g = gate.borrow();
            (g.index(), g.base().parents_len())
        };
        if let Some(entry) = gates.get_mut(&gate_index) {
            let result = entry.0.clone();
            entry.1 += 1;
            if entry.1 >= parents_len {
                gates.remove(&gate_index);
            }
            return result;
        }
        let (connective, variable_args, gate_args) = {
            let g = gate.borrow();
            (
                g.connective(),
                g.variable_args().to_vec(),
                g.gate_args().to_vec(),
            )
        };
        let mut args: Vec<VertexPtr> = Vec::new();
        for (signed_index, var) in &variable_args {
            let vertex = self.find_or_add(
                *signed_index,
                &self.base.clone(),
                &self.empty.clone(),
                var.order(),
                false,
                false,
            );
            args.push(vertex);
        }
        for (signed_index, child) in &gate_args {
            debug_assert!(
                *signed_index > 0,
                "Complements must be pushed down to variables."
            );
            if child.borrow().module() {
                module_gates.insert(*signed_index, child.clone());
                let vertex = {
                    let c = child.borrow();
                    self.find_or_add(
                        c.index(),
                        &self.base.clone(),
                        &self.empty.clone(),
                        c.base().order(),
                        true,
                        c.coherent(),
                    )
                };
                args.push(vertex);
            } else {
                args.push(self.convert_graph(child, gates, module_gates));
            }
        }
        args.sort_by_key(|vertex| {
            if vertex.terminal() {
                (0, 0)
            } else {
                (1, -vertex.as_node().order())
            }
        });
        let limit = self.settings.limit_order_value();
        let mut iter = args.into_iter();
        let mut result = iter.next().expect("Gate without arguments.");
        for arg in iter {
            result = self.apply(connective, &result, &arg, limit);
        }
        self.clear_tables();
        debug_assert!(result.terminal() || result.as_node().max_set_order() <= limit);
        if parents_len > 1 {
            gates.insert(gate_index, (result.clone(), 1));
        }
        result
    }

    // ------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------

    fn result_key(one: &VertexPtr, two: &VertexPtr, limit_order: i32) -> (i32, i32, i32) {
        debug_assert!(limit_order >= 0, "Illegal order for computations.");
        debug_assert!(!one.terminal() && !two.terminal());
        debug_assert_ne!(one.id(), two.id());
        (one.id().min(two.id()), one.id().max(two.id()), limit_order)
    }

    /// Applies a Boolean set operation with an order limit.
    ///
    /// The limit upper-bounds the size of the largest product kept; any
    /// recursion whose product must exceed it returns Empty.
    pub(crate) fn apply(
        &mut self,
        connective: Connective,
        one: &VertexPtr,
        two: &VertexPtr,
        limit_order: i32,
    ) -> VertexPtr {
        match connective {
            Connective::And => self.apply_and(one, two, limit_order),
            Connective::Or => self.apply_or(one, two, limit_order),
            _ => unreachable!("Only normalized operations reach the ZBDD."),
        }
    }

    /// Product of two set families.
    fn apply_and(&mut self, one: &VertexPtr, two: &VertexPtr, limit_order: i32) -> VertexPtr {
        if limit_order < 0 {
            return self.empty.clone();
        }
        if one.terminal() {
            return if one.base_value() {
                self.prune(two, limit_order)
            } else {
                self.empty.clone()
            };
        }
        if two.terminal() {
            return if two.base_value() {
                self.prune(one, limit_order)
            } else {
                self.empty.clone()
            };
        }
        if one.id() == two.id() {
            return self.prune(one, limit_order);
        }
        let key = Zbdd::result_key(one, two, limit_order);
        if let Some(result) = self.and_table.get(&key) {
            return result.clone();
        }
        let (set_one, set_two) = Zbdd::order_pair(one, two);
        let result = self.apply_and_nodes(&set_one, &set_two, limit_order);
        debug_assert!(result.terminal() || result.as_node().max_set_order() <= limit_order);
        self.and_table.insert(key, result.clone());
        result
    }

    /// Union of two set families.
    fn apply_or(&mut self, one: &VertexPtr, two: &VertexPtr, limit_order: i32) -> VertexPtr {
        if limit_order < 0 {
            return self.empty.clone();
        }
        if one.terminal() {
            return if one.base_value() {
                self.base.clone()
            } else {
                self.prune(two, limit_order)
            };
        }
        if two.terminal() {
            return if two.base_value() {
                self.base.clone()
            } else {
                self.prune(one, limit_order)
            };
        }
        if one.id() == two.id() {
            return self.prune(one, limit_order);
        }
        let key = Zbdd::result_key(one, two, limit_order);
        if let Some(result) = self.or_table.get(&key) {
            return result.clone();
        }
        let (set_one, set_two) = Zbdd::order_pair(one, two);
        let result = self.apply_or_nodes(&set_one, &set_two, limit_order);
        debug_assert!(result.terminal() || result.as_node().max_set_order() <= limit_order);
        self.or_table.insert(key, result.clone());
        result
    }

    /// Sorts a vertex pair by order, then positive index before negative.
    fn order_pair(one: &VertexPtr, two: &VertexPtr) -> (VertexPtr, VertexPtr) {
        let n1 = one.as_node();
        let n2 = two.as_node();
        if n1.order() > n2.order() || (n1.order() == n2.order() && n1.index() < n2.index()) {
            (two.clone(), one.clone())
        } else {
            (one.clone(), two.clone())
        }
    }

    /// `(x*f1 + f0) * (x*g1 + g0) = x*(f1*(g1 + g0) + f0*g1) + f0*g0`
    fn apply_and_nodes(&mut self, one: &VertexPtr, two: &VertexPtr, limit_order: i32) -> VertexPtr {
        let (f_high, f_low, g_high, g_low, same_literal, same_order) = {
            let n1 = one.as_node();
            let n2 = two.as_node();
            (
                n1.high().clone(),
                n1.low().clone(),
                n2.high().clone(),
                n2.low().clone(),
                n1.order() == n2.order() && n1.index() == n2.index(),
                n1.order() == n2.order(),
            )
        };
        let limit_high = limit_order - i32::from(!self.may_be_unity(one.as_node()));
        let (high, low) = if same_literal {
            let g_any = self.apply_or(&g_high, &g_low, limit_high);
            let f1_part = self.apply_and(&f_high, &g_any, limit_high);
            let f0_g1 = self.apply_and(&f_low, &g_high, limit_high);
            let high = self.apply_or(&f1_part, &f0_g1, limit_high);
            let low = self.apply_and(&f_low, &g_low, limit_order);
            (high, low)
        } else {
            debug_assert!(
                one.as_node().order() < two.as_node().order()
                    || one.as_node().index() > two.as_node().index(),
                "Ordering contract failed."
            );
            let high = if same_order {
                // (x*f1 + f0) * (~x*g1 + g0) = x*f1*g0 + f0*(~x*g1 + g0)
                self.apply_and(&f_high, &g_low, limit_high)
            } else {
                self.apply_and(&f_high, two, limit_high)
            };
            let low = self.apply_and(&f_low, two, limit_order);
            (high, low)
        };
        let high = self.drop_sibling_literal(high, one);
        let reduced = self.reduced_from_node(one, &high, &low);
        self.minimize(&reduced)
    }

    /// Union over ordered set nodes.
    fn apply_or_nodes(&mut self, one: &VertexPtr, two: &VertexPtr, limit_order: i32) -> VertexPtr {
        let (f_high, f_low, same_literal, same_order) = {
            let n1 = one.as_node();
            let n2 = two.as_node();
            (
                n1.high().clone(),
                n1.low().clone(),
                n1.order() == n2.order() && n1.index() == n2.index(),
                n1.order() == n2.order(),
            )
        };
        let limit_high = limit_order - i32::from(!self.may_be_unity(one.as_node()));
        let (high, low) = if same_literal {
            let g_high = two.as_node().high().clone();
            let g_low = two.as_node().low().clone();
            let high = self.apply_or(&f_high, &g_high, limit_high);
            let low = self.apply_or(&f_low, &g_low, limit_order);
            (high, low)
        } else {
            debug_assert!(
                one.as_node().order() < two.as_node().order()
                    || one.as_node().index() > two.as_node().index(),
                "Ordering contract failed."
            );
            if same_order {
                let g_high = two.as_node().high().clone();
                if f_high.terminal() && g_high.terminal() {
                    // x + ~x covers the whole space under cut sets.
                    return self.base.clone();
                }
            }
            let high = self.prune(&f_high, limit_high);
            let low = self.apply_or(&f_low, two, limit_order);
            (high, low)
        };
        let high = self.drop_sibling_literal(high, one);
        let reduced = self.reduced_from_node(one, &high, &low);
        self.minimize(&reduced)
    }

    /// If the computed high branch starts at the complement sibling of the
    /// prototype node, skip its literal.
    fn drop_sibling_literal(&mut self, high: VertexPtr, proto: &VertexPtr) -> VertexPtr {
        if !high.terminal() && high.as_node().order() == proto.as_node().order() {
            debug_assert!(high.as_node().index() < proto.as_node().index());
            return high.as_node().low().clone();
        }
        high
    }

    // ------------------------------------------------------------------
    // Minimization
    // ------------------------------------------------------------------

    /// Removes products that strictly contain other products.
    ///
    /// Idempotent under diagram identity.
    pub(crate) fn minimize(&mut self, vertex: &VertexPtr) -> VertexPtr {
        if vertex.terminal() {
            return vertex.clone();
        }
        if vertex.as_node().minimal() {
            return vertex.clone();
        }
        if let Some(result) = self.minimal_results.get(&vertex.id()) {
            return result.clone();
        }
        let (high_branch, low_branch) = {
            let node = vertex.as_node();
            (node.high().clone(), node.low().clone())
        };
        let high = self.minimize(&high_branch);
        let low = self.minimize(&low_branch);
        let high = self.subsume(&high, &low);
        debug_assert!(high.id() != low.id(), "Subsume failed.");
        let result = if high.terminal() && !high.base_value() {
            low // Reduction rule.
        } else {
            let replacement = self.find_or_add_like(vertex, &high, &low);
            replacement.as_node().minimal.set(true);
            replacement
        };
        self.minimal_results.insert(vertex.id(), result.clone());
        result
    }

    /// Removes from the high family every product that is a superset of
    /// any product in the low family.
    fn subsume(&mut self, high: &VertexPtr, low: &VertexPtr) -> VertexPtr {
        if low.terminal() {
            return if low.base_value() {
                self.empty.clone()
            } else {
                high.clone()
            };
        }
        if high.terminal() {
            return high.clone(); // No need to reduce terminal sets.
        }
        let key = (high.id(), low.id());
        if let Some(result) = self.subsume_table.get(&key) {
            return result.clone();
        }
        let (h_order, h_index, h_high, h_low, h_minimal) = {
            let node = high.as_node();
            (
                node.order(),
                node.index(),
                node.high().clone(),
                node.low().clone(),
                node.minimal(),
            )
        };
        let (l_order, l_index, l_high, l_low) = {
            let node = low.as_node();
            (
                node.order(),
                node.index(),
                node.high().clone(),
                node.low().clone(),
            )
        };
        if h_order > l_order || (h_order == l_order && h_index < l_index) {
            let result = self.subsume(high, &l_low);
            self.subsume_table.insert(key, result.clone());
            return result;
        }
        let (subhigh, sublow) = if h_order == l_order && h_index == l_index {
            let subhigh = self.subsume(&h_high, &l_high);
            let subhigh = self.subsume(&subhigh, &l_low);
            let sublow = self.subsume(&h_low, &l_low);
            (subhigh, sublow)
        } else {
            debug_assert!(h_order < l_order || (h_order == l_order && h_index > l_index));
            let subhigh = self.subsume(&h_high, low);
            let sublow = self.subsume(&h_low, low);
            (subhigh, sublow)
        };
        let result = if subhigh.terminal() && !subhigh.base_value() {
            sublow
        } else {
            debug_assert!(subhigh.id() != sublow.id());
            let new_high = self.find_or_add_like(high, &subhigh, &sublow);
            new_high.as_node().minimal.set(h_minimal);
            new_high
        };
        self.subsume_table.insert(key, result.clone());
        result
    }

    /// Drops every path whose cumulative order exceeds the limit.
    ///
    /// Size-stable: a minimal input yields a minimal result.
    pub(crate) fn prune(&mut self, vertex: &VertexPtr, limit_order: i32) -> VertexPtr {
        if limit_order < 0 {
            return self.empty.clone();
        }
        if vertex.terminal() {
            return vertex.clone();
        }
        if vertex.as_node().max_set_order() <= limit_order {
            return vertex.clone();
        }
        let key = (vertex.id(), limit_order);
        if let Some(result) = self.prune_results.get(&key) {
            return result.clone();
        }
        let (high_branch, low_branch, minimal) = {
            let node = vertex.as_node();
            (node.high().clone(), node.low().clone(), node.minimal())
        };
        let limit_high = limit_order - i32::from(!self.may_be_unity(vertex.as_node()));
        let high = self.prune(&high_branch, limit_high);
        let low = self.prune(&low_branch, limit_order);
        let result = self.reduced_from_node(vertex, &high, &low);
        if !result.terminal() {
            result.as_node().minimal.set(minimal);
        }
        self.prune_results.insert(key, result.clone());
        result
    }

    // ------------------------------------------------------------------
    // Complement and constant-module elimination
    // ------------------------------------------------------------------

    /// Discards complement literals: each negative-literal node becomes the
    /// union of its branches. Non-coherent module proxies are kept; their
    /// elimination is delegated to the sub-diagram.
    pub(crate) fn eliminate_complements_from(
        &mut self,
        vertex: &VertexPtr,
        results: &mut FxHashMap<i32, VertexPtr>,
    ) -> VertexPtr {
        if vertex.terminal() {
            return vertex.clone();
        }
        if let Some(result) = results.get(&vertex.id()) {
            return result.clone();
        }
        let (high_branch, low_branch) = {
            let node = vertex.as_node();
            (node.high().clone(), node.low().clone())
        };
        let high = self.eliminate_complements_from(&high_branch, results);
        let low = self.eliminate_complements_from(&low_branch, results);
        let result = self.eliminate_complement(vertex, &high, &low);
        results.insert(vertex.id(), result.clone());
        result
    }

    fn eliminate_complement(
        &mut self,
        vertex: &VertexPtr,
        high: &VertexPtr,
        low: &VertexPtr,
    ) -> VertexPtr {
        let limit = self.settings.limit_order_value();
        debug_assert!(high.terminal() || high.as_node().max_set_order() <= limit);
        debug_assert!(low.terminal() || low.as_node().max_set_order() <= limit);
        let node = vertex.as_node();
        if node.index() < 0 && !(node.module() && !node.coherent()) {
            return self.apply_or(high, low, limit);
        }
        let reduced = self.reduced_from_node(vertex, high, low);
        self.minimize(&reduced)
    }

    /// Substitutes modules whose sub-diagram is a terminal: a Base module
    /// behaves like `high ∪ low`, an Empty module like `low`.
    pub(crate) fn eliminate_constant_modules(&mut self) {
        if self.modules.values().any(|module| module.root.terminal()) {
            debug!("Eliminating constant modules from ZBDD: G{}", self.module_index);
            let mut results = FxHashMap::default();
            let root = self.root.clone();
            self.root = self.eliminate_constant_modules_from(&root, &mut results);
        }
    }

    fn eliminate_constant_modules_from(
        &mut self,
        vertex: &VertexPtr,
        results: &mut FxHashMap<i32, VertexPtr>,
    ) -> VertexPtr {
        if vertex.terminal() {
            return vertex.clone();
        }
        if let Some(result) = results.get(&vertex.id()) {
            return result.clone();
        }
        let (high_branch, low_branch) = {
            let node = vertex.as_node();
            (node.high().clone(), node.low().clone())
        };
        let high = self.eliminate_constant_modules_from(&high_branch, results);
        let low = self.eliminate_constant_modules_from(&low_branch, results);
        let result = self.eliminate_constant_module(vertex, &high, &low);
        results.insert(vertex.id(), result.clone());
        result
    }

    fn eliminate_constant_module(
        &mut self,
        vertex: &VertexPtr,
        high: &VertexPtr,
        low: &VertexPtr,
    ) -> VertexPtr {
        let node = vertex.as_node();
        if node.module() {
            let constant = self.modules.get(&node.index()).and_then(|module| {
                if module.root.terminal() {
                    Some(module.root.base_value())
                } else {
                    None
                }
            });
            match constant {
                Some(false) => return low.clone(),
                Some(true) => {
                    let limit = self.settings.limit_order_value();
                    return self.apply_or(high, low, limit);
                }
                None => {}
            }
        }
        let reduced = self.reduced_from_node(vertex, high, low);
        self.minimize(&reduced)
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Collects module proxies with their coherence and the tightest
    /// per-module order cut-offs implied by the surrounding products.
    ///
    /// Returns the minimum product order from the bottom, or -1 when the
    /// vertex is the Empty terminal reachable on low branches only.
    pub(crate) fn gather_modules(
        &mut self,
        vertex: &VertexPtr,
        current_order: i32,
        modules: &mut BTreeMap<i32, (bool, i32)>,
    ) -> i32 {
        debug_assert!(current_order >= 0);
        if vertex.terminal() {
            return if vertex.base_value() { 0 } else { -1 };
        }
        let node = vertex.as_node();
        let contribution = i32::from(!self.may_be_unity(node));
        let (node_index, node_module, node_coherent, high_branch, low_branch) = (
            node.index(),
            node.module(),
            node.coherent(),
            node.high().clone(),
            node.low().clone(),
        );
        let high_order = current_order + contribution;
        let min_high = self.gather_modules(&high_branch, high_order, modules);
        debug_assert!(min_high >= 0, "Terminal Empty on a high branch.");
        if node_module {
            let module_order = self.settings.limit_order_value() - min_high - current_order;
            debug_assert!(module_order >= 0, "Improper application of a cut-off.");
            modules
                .entry(node_index)
                .and_modify(|entry| {
                    debug_assert!(entry.0 == node_coherent, "Inconsistent flags.");
                    entry.1 = entry.1.max(module_order);
                })
                .or_insert((node_coherent, module_order));
        }
        let min_low = self.gather_modules(&low_branch, current_order, modules);
        debug_assert!(min_low >= -1);
        if min_low == -1 {
            return min_high + contribution;
        }
        (min_high + contribution).min(min_low)
    }

    // ------------------------------------------------------------------
    // Enumeration and counting
    // ------------------------------------------------------------------

    /// Iterates over the products of the family.
    ///
    /// Module proxies are composed in place, so each yielded product holds
    /// only variable literals, sorted by variable with the positive sign
    /// first. Products never exceed the order limit.
    pub fn products(&self) -> Products {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_products(&self.root, &mut prefix, &mut out);
        Products {
            inner: out.into_iter(),
        }
    }

    fn collect_products(&self, vertex: &VertexPtr, prefix: &mut Vec<i32>, out: &mut Vec<Vec<i32>>) {
        let limit = self.settings.limit_order_value().max(0) as usize;
        match &**vertex {
            Vertex::Empty => {}
            Vertex::Base => {
                let mut product = prefix.clone();
                product.sort_by_key(|literal| (literal.abs(), *literal < 0));
                out.push(product);
            }
            Vertex::Node(node) => {
                if node.module() {
                    let module = self
                        .modules
                        .get(&node.index())
                        .expect("Unregistered module in ZBDD.");
                    for sub_product in module.products() {
                        if prefix.len() + sub_product.len() <= limit {
                            let mark = prefix.len();
                            prefix.extend(sub_product);
                            self.collect_products(node.high(), prefix, out);
                            prefix.truncate(mark);
                        }
                    }
                } else if prefix.len() < limit {
                    prefix.push(node.index());
                    self.collect_products(node.high(), prefix, out);
                    prefix.pop();
                }
                self.collect_products(node.low(), prefix, out);
            }
        }
    }

    /// Counts set nodes reachable from a vertex, excluding modules.
    ///
    /// Node marks must be clear before the call.
    pub fn count_set_nodes(&self, vertex: &VertexPtr) -> i32 {
        if vertex.terminal() {
            return 0;
        }
        let node = vertex.as_node();
        if node.mark.get() {
            return 0;
        }
        node.mark.set(true);
        1 + self.count_set_nodes(node.high()) + self.count_set_nodes(node.low())
    }

    /// Counts the number of products in the family.
    ///
    /// Node marks must be clear before the call; the count slots are used
    /// for memoization.
    pub fn count_products(&self, vertex: &VertexPtr, with_modules: bool) -> i64 {
        if vertex.terminal() {
            return i64::from(vertex.base_value());
        }
        let node = vertex.as_node();
        if node.mark.get() {
            return node.count();
        }
        node.mark.set(true);
        let mut multiplier = 1;
        if with_modules && node.module() {
            let module = self
                .modules
                .get(&node.index())
                .expect("Unregistered module in ZBDD.");
            multiplier = module.count_products(&module.root, true);
        }
        let result = multiplier * self.count_products(node.high(), with_modules)
            + self.count_products(node.low(), with_modules);
        node.count.set(result);
        result
    }

    /// Clears node marks contiguously, optionally through modules.
    pub fn clear_marks(&self, vertex: &VertexPtr, with_modules: bool) {
        if vertex.terminal() {
            return;
        }
        let node = vertex.as_node();
        if !node.mark.get() {
            return;
        }
        node.mark.set(false);
        if with_modules && node.module() {
            let module = self
                .modules
                .get(&node.index())
                .expect("Unregistered module in ZBDD.");
            module.clear_marks(&module.root, true);
        }
        self.clear_marks(node.high(), with_modules);
        self.clear_marks(node.low(), with_modules);
    }

    /// Verifies the ordering, zero-suppression, and minimality invariants.
    #[cfg(test)]
    pub(crate) fn test_structure(&self, vertex: &VertexPtr, with_modules: bool) {
        if vertex.terminal() {
            return;
        }
        let node = vertex.as_node();
        if node.mark.get() {
            return;
        }
        node.mark.set(true);
        assert!(node.index() != 0, "Illegal index for a node.");
        assert!(node.order() > 0, "Improper order for nodes.");
        assert!(
            !(node.high().terminal() && !node.high().base_value()),
            "Zero-suppression rule failure."
        );
        assert!(
            node.high().id() != node.low().id(),
            "Minimization failure."
        );
        assert!(
            !(!node.high().terminal() && node.order() >= node.high().as_node().order()),
            "Ordering of nodes failed."
        );
        assert!(
            !(!node.low().terminal() && node.order() > node.low().as_node().order()),
            "Ordering of nodes failed."
        );
        assert!(
            !(!node.low().terminal()
                && node.order() == node.low().as_node().order()
                && node.index() <= node.low().as_node().index()),
            "Ordering of complements failed."
        );
        if node.minimal() {
            assert!(
                node.high().terminal() || node.high().as_node().minimal(),
                "Non-minimal branches in a minimal ZBDD."
            );
            assert!(
                node.low().terminal() || node.low().as_node().minimal(),
                "Non-minimal branches in a minimal ZBDD."
            );
        }
        if with_modules && node.module() {
            let module = self
                .modules
                .get(&node.index())
                .expect("Unregistered module in ZBDD.");
            module.test_structure(&module.root, true);
        }
        self.test_structure(node.high(), with_modules);
        self.test_structure(node.low(), with_modules);
    }

    /// Clears all memoization tables.
    pub(crate) fn clear_tables(&mut self) {
        self.and_table.clear();
        self.or_table.clear();
        self.minimal_results.clear();
        self.subsume_table.clear();
        self.prune_results.clear();
    }

    /// Releases all working memory once the diagram is final.
    pub(crate) fn freeze(&mut self) {
        self.unique_table.release();
        self.and_table = TripletTable::default();
        self.or_table = TripletTable::default();
        self.minimal_results = FxHashMap::default();
        self.subsume_table = PairTable::default();
        self.prune_results = PairTable::default();
    }
}

/// Iterator over the products of a ZBDD.
pub struct Products {
    inner: std::vec::IntoIter<Vec<i32>>,
}

impl Iterator for Products {
    type Item = Vec<i32>;

    fn next(&mut self) -> Option<Vec<i32>> {
        self.inner.next()
    }
}

impl ExactSizeIterator for Products {
    fn len(&self) -> usize {
        self.inner.len()
    }
}
