//! Reduced ordered binary decision diagrams with complement edges
//!
//! The diagram keeps a single terminal vertex (TRUE); FALSE is expressed as
//! a complement edge to it. The complement attribute lives on the low/else
//! edge of each vertex, so a function and its negation share all vertices.
//! Vertices are hash-consed through a weak unique table, and the AND/OR
//! Apply operations are memoized per sub-expression in compute tables keyed
//! by the ordered pair of function ids.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::pdag::{Connective, Gate, GatePtr, Pdag};
use crate::settings::Settings;
use crate::tables::{PairTable, UniqueTable};

#[cfg(test)]
mod tests;

/// Shared vertices of the BDD.
pub type VertexPtr = Rc<Vertex>;

/// A vertex of the BDD: the single TRUE terminal or an if-then-else node.
pub enum Vertex {
    /// The TRUE terminal with the reserved id 1.
    Terminal,
    /// A non-terminal if-then-else vertex.
    Ite(Ite),
}

impl Vertex {
    /// The unique id of the function graph rooted at this vertex.
    pub fn id(&self) -> i32 {
        match self {
            Vertex::Terminal => 1,
            Vertex::Ite(ite) => ite.id,
        }
    }

    /// True if this vertex is the terminal.
    pub fn terminal(&self) -> bool {
        matches!(self, Vertex::Terminal)
    }

    /// The if-then-else payload of a non-terminal vertex.
    ///
    /// Panics on terminal vertices; callers must check first.
    pub fn as_ite(&self) -> &Ite {
        match self {
            Vertex::Ite(ite) => ite,
            Vertex::Terminal => panic!("Terminal vertex has no if-then-else data."),
        }
    }
}

/// Non-terminal if-then-else vertex.
///
/// The complement attribute applies to the low branch; consistency of the
/// attribute is the responsibility of the algorithms, not the vertex.
pub struct Ite {
    index: i32,
    order: i32,
    id: i32,
    complement_edge: bool,
    high: VertexPtr,
    low: VertexPtr,
    module: Cell<bool>,
    coherent: Cell<bool>,
    mark: Cell<bool>,
    p: Cell<f64>,
    factor: Cell<f64>,
}

impl Ite {
    fn new(
        index: i32,
        order: i32,
        id: i32,
        high: VertexPtr,
        low: VertexPtr,
        complement_edge: bool,
    ) -> Self {
        Ite {
            index,
            order,
            id,
            complement_edge,
            high,
            low,
            module: Cell::new(false),
            coherent: Cell::new(false),
            mark: Cell::new(false),
            p: Cell::new(0.0),
            factor: Cell::new(0.0),
        }
    }

    /// The variable (or module gate) index of this vertex.
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The ordering rank of the vertex variable.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// The (1/True/then) branch vertex.
    pub fn high(&self) -> &VertexPtr {
        &self.high
    }

    /// The (0/False/else) branch vertex.
    pub fn low(&self) -> &VertexPtr {
        &self.low
    }

    /// True if the low branch is interpreted as its complement.
    pub fn complement_edge(&self) -> bool {
        self.complement_edge
    }

    /// True if this vertex proxies a module function.
    pub fn module(&self) -> bool {
        self.module.get()
    }

    /// True if the proxied module is coherent.
    pub fn coherent(&self) -> bool {
        self.coherent.get()
    }

    /// The traversal mark.
    pub fn mark(&self) -> bool {
        self.mark.get()
    }

    /// Sets the traversal mark.
    pub fn set_mark(&self, flag: bool) {
        self.mark.set(flag);
    }

    /// The memoized probability of this function graph.
    pub fn p(&self) -> f64 {
        self.p.get()
    }

    /// Memoizes the probability of this function graph.
    pub fn set_p(&self, value: f64) {
        self.p.set(value);
    }

    /// The memoized importance factor.
    pub fn factor(&self) -> f64 {
        self.factor.get()
    }

    /// Memoizes an importance factor calculation.
    pub fn set_factor(&self, value: f64) {
        self.factor.set(value);
    }
}

/// A BDD function: a root vertex with its complement interpretation.
#[derive(Clone)]
pub struct Function {
    /// The interpretation of the function graph.
    pub complement: bool,
    /// The root vertex of the function graph.
    pub vertex: VertexPtr,
}

/// Reduced ordered BDD with attributed edges built from a PDAG.
pub struct Bdd {
    settings: Settings,
    root: Function,
    coherent: bool,
    one: VertexPtr,
    unique_table: UniqueTable<Vertex>,
    and_table: PairTable<Function>,
    or_table: PairTable<Function>,
    modules: FxHashMap<i32, Function>,
    index_to_order: FxHashMap<i32, i32>,
    function_id: i32,
}

impl Bdd {
    /// Builds a reduced ordered BDD from a preprocessed PDAG.
    ///
    /// The graph must already carry its variable ordering.
    pub fn new(graph: &Pdag, settings: &Settings) -> Bdd {
        let one: VertexPtr = Rc::new(Vertex::Terminal);
        let mut bdd = Bdd {
            settings: settings.clone(),
            root: Function {
                complement: false,
                vertex: one.clone(),
            },
            coherent: graph.coherent(),
            one,
            unique_table: UniqueTable::new(),
            and_table: PairTable::default(),
            or_table: PairTable::default(),
            modules: FxHashMap::default(),
            index_to_order: FxHashMap::default(),
            function_id: 2,
        };
        debug!("Converting the graph into BDD");
        if graph.is_trivial() {
            let root_gate = graph.root();
            let r = root_gate.borrow();
            debug_assert_eq!(r.args().len(), 1);
            debug_assert!(r.gate_args().is_empty());
            let child = *r.args().iter().next().expect("Trivial gate argument.");
            if r.constant() {
                bdd.root = Function {
                    complement: child < 0,
                    vertex: bdd.one.clone(),
                };
            } else {
                let (_, var) = &r.variable_args()[0];
                let vertex =
                    bdd.find_or_add(var.index(), &bdd.one.clone(), &bdd.one.clone(), true, var.order());
                bdd.index_to_order.insert(var.index(), var.order());
                bdd.root = Function {
                    complement: child < 0,
                    vertex,
                };
            }
        } else {
            let mut gates = FxHashMap::default();
            let root = bdd.convert_graph(&graph.root(), &mut gates);
            bdd.root = Function {
                complement: root.complement ^ graph.complement(),
                vertex: root.vertex,
            };
        }
        bdd.clear_marks(false);
        bdd.test_structure(&bdd.root.vertex.clone());
        debug!("BDD vertices created: {}", bdd.function_id - 2);
        debug!("Unique table entries: {}", bdd.unique_table.len());
        bdd.clear_marks(false);
        let ite_count = bdd.count_ite_nodes(&bdd.root.vertex.clone());
        debug!("ITE vertices in the final BDD: {}", ite_count);
        bdd.clear_marks(false);
        if bdd.coherent {
            // No more Apply calls are expected over a coherent diagram.
            bdd.freeze();
        } else {
            bdd.clear_tables();
        }
        bdd
    }

    /// The root function of the diagram.
    pub fn root(&self) -> &Function {
        &self.root
    }

    /// Module functions keyed by the module gate index.
    pub fn modules(&self) -> &FxHashMap<i32, Function> {
        &self.modules
    }

    /// Mapping from variable indices to their ordering ranks.
    pub fn index_to_order(&self) -> &FxHashMap<i32, i32> {
        &self.index_to_order
    }

    /// True if the BDD was built from a coherent graph.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// Analysis settings of this diagram.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sets all vertex marks, including module graphs, to the given value.
    pub fn clear_marks(&self, mark: bool) {
        self.clear_marks_from(&self.root.vertex.clone(), mark);
    }

    fn clear_marks_from(&self, vertex: &VertexPtr, mark: bool) {
        if vertex.terminal() {
            return;
        }
        let ite = vertex.as_ite();
        if ite.mark() == mark {
            return;
        }
        ite.set_mark(mark);
        if ite.module() {
            let module = self
                .modules
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            self.clear_marks_from(&module.vertex, mark);
        }
        self.clear_marks_from(&ite.high().clone(), mark);
        self.clear_marks_from(&ite.low().clone(), mark);
    }

    /// Finds or creates a unique if-then-else vertex.
    ///
    /// Every vertex of the diagram must be created through this function,
    /// or the diagram may lose reduction.
    fn find_or_add(
        &mut self,
        index: i32,
        high: &VertexPtr,
        low: &VertexPtr,
        complement_edge: bool,
        order: i32,
    ) -> VertexPtr {
        debug_assert!(index > 0, "Only positive indices are expected.");
        debug_assert!(order > 0, "Improper order.");
        let key = (
            index,
            high.id(),
            if complement_edge { -low.id() } else { low.id() },
        );
        if let Some(vertex) = self.unique_table.find(key) {
            return vertex;
        }
        let id = self.function_id;
        self.function_id += 1;
        let vertex: VertexPtr = Rc::new(Vertex::Ite(Ite::new(
            index,
            order,
            id,
            high.clone(),
            low.clone(),
            complement_edge,
        )));
        self.unique_table.insert(key, &vertex);
        vertex
    }

    /// Finds or creates a vertex inheriting the meta-data of a prototype.
    fn find_or_add_like(
        &mut self,
        proto: &Ite,
        high: &VertexPtr,
        low: &VertexPtr,
        complement_edge: bool,
    ) -> VertexPtr {
        let vertex = self.find_or_add(proto.index(), high, low, complement_edge, proto.order());
        let ite = vertex.as_ite();
        ite.module.set(proto.module());
        ite.coherent.set(proto.coherent());
        vertex
    }

    /// Finds or creates a module proxy vertex for a gate.
    fn find_or_add_proxy(
        &mut self,
        gate: &Gate,
        high: &VertexPtr,
        low: &VertexPtr,
        complement_edge: bool,
    ) -> VertexPtr {
        debug_assert!(gate.module(), "Only module gates are proxied.");
        let vertex = self.find_or_add(
            gate.index(),
            high,
            low,
            complement_edge,
            gate.base().order(),
        );
        let ite = vertex.as_ite();
        ite.module.set(true);
        ite.coherent.set(gate.coherent());
        vertex
    }

    /// Converts a normalized gate tree into BDD functions bottom-up.
    fn convert_graph(
        &mut self,
        gate: &GatePtr,
        gates: &mut FxHashMap<i32, (Function, usize)>,
    ) -> Function {
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
        let mut args: Vec<Function> = Vec::new();
        for (signed_index, var) in &variable_args {
            let vertex =
                self.find_or_add(var.index(), &self.one.clone(), &self.one.clone(), true, var.order());
            self.index_to_order.insert(var.index(), var.order());
            args.push(Function {
                complement: *signed_index < 0,
                vertex,
            });
        }
        for (signed_index, child) in &gate_args {
            let result = self.convert_graph(child, gates);
            if child.borrow().module() {
                self.modules.insert(child.borrow().index(), result);
                let proxy = {
                    let c = child.borrow();
                    self.find_or_add_proxy(&c, &self.one.clone(), &self.one.clone(), true)
                };
                args.push(Function {
                    complement: *signed_index < 0,
                    vertex: proxy,
                });
            } else {
                args.push(Function {
                    complement: (*signed_index < 0) ^ result.complement,
                    vertex: result.vertex,
                });
            }
        }
        // Fold in decreasing variable order so Apply follows the ordering.
        args.sort_by_key(|function| {
            if function.vertex.terminal() {
                (0, 0)
            } else {
                (1, -function.vertex.as_ite().order())
            }
        });
        let mut iter = args.into_iter();
        let mut result = iter.next().expect("Gate without arguments.");
        for arg in iter {
            result = self.apply(
                connective,
                &result.vertex,
                &arg.vertex,
                result.complement,
                arg.complement,
            );
        }
        self.clear_tables();
        if parents_len > 1 {
            gates.insert(gate_index, (result.clone(), 1));
        }
        result
    }

    /// Canonical compute-table key: signed ids ordered by unsigned id.
    fn min_max_id(one: &VertexPtr, two: &VertexPtr, c1: bool, c2: bool) -> (i32, i32) {
        debug_assert!(!one.terminal() && !two.terminal());
        debug_assert_ne!(one.id(), two.id());
        let mut min_id = if c1 { -one.id() } else { one.id() };
        let mut max_id = if c2 { -two.id() } else { two.id() };
        if one.id() > two.id() {
            std::mem::swap(&mut min_id, &mut max_id);
        }
        (min_id, max_id)
    }

    /// Applies a Boolean operation to two function graphs.
    ///
    /// Only AND and OR are supported; other connectives are lowered by the
    /// graph preprocessor before diagrams are built.
    pub(crate) fn apply(
        &mut self,
        connective: Connective,
        one: &VertexPtr,
        two: &VertexPtr,
        complement_one: bool,
        complement_two: bool,
    ) -> Function {
        match connective {
            Connective::And | Connective::Or => {}
            _ => unreachable!("Unsupported connective for Apply."),
        }
        let conjunction = connective == Connective::And;
        if one.terminal() {
            return if conjunction {
                if complement_one {
                    Function {
                        complement: true,
                        vertex: self.one.clone(),
                    }
                } else {
                    Function {
                        complement: complement_two,
                        vertex: two.clone(),
                    }
                }
            } else if !complement_one {
                Function {
                    complement: false,
                    vertex: self.one.clone(),
                }
            } else {
                Function {
                    complement: complement_two,
                    vertex: two.clone(),
                }
            };
        }
        if two.terminal() {
            return self.apply(connective, two, one, complement_two, complement_one);
        }
        if one.id() == two.id() {
            // Reduction detection.
            return if complement_one ^ complement_two {
                Function {
                    complement: conjunction,
                    vertex: self.one.clone(),
                }
            } else {
                Function {
                    complement: complement_one,
                    vertex: one.clone(),
                }
            };
        }
        let key = Bdd::min_max_id(one, two, complement_one, complement_two);
        let table = if conjunction {
            &self.and_table
        } else {
            &self.or_table
        };
        if let Some(result) = table.get(&key) {
            return result.clone();
        }
        let result = self.apply_ites(connective, one, two, complement_one, complement_two);
        let table = if conjunction {
            &mut self.and_table
        } else {
            &mut self.or_table
        };
        table.insert(key, result.clone());
        result
    }

    /// Applies the operation to two non-terminal vertices.
    fn apply_ites(
        &mut self,
        connective: Connective,
        one: &VertexPtr,
        two: &VertexPtr,
        complement_one: bool,
        complement_two: bool,
    ) -> Function {
        let (one, two, complement_one, complement_two) = {
            if one.as_ite().order() > two.as_ite().order() {
                (two.clone(), one.clone(), complement_two, complement_one)
            } else {
                (one.clone(), two.clone(), complement_one, complement_two)
            }
        };
        let node_one = one.as_ite();
        let node_two = two.as_ite();
        let (high, low) = if node_one.order() == node_two.order() {
            debug_assert_eq!(node_one.index(), node_two.index());
            let high = self.apply(
                connective,
                node_one.high(),
                node_two.high(),
                complement_one,
                complement_two,
            );
            let low = self.apply(
                connective,
                node_one.low(),
                node_two.low(),
                complement_one ^ node_one.complement_edge(),
                complement_two ^ node_two.complement_edge(),
            );
            (high, low)
        } else {
            debug_assert!(node_one.order() < node_two.order());
            let high = self.apply(
                connective,
                node_one.high(),
                &two,
                complement_one,
                complement_two,
            );
            let low = self.apply(
                connective,
                node_one.low(),
                &two,
                complement_one ^ node_one.complement_edge(),
                complement_two,
            );
            (high, low)
        };
        let complement_edge = high.complement ^ low.complement;
        if complement_edge || high.vertex.id() != low.vertex.id() {
            let vertex = self.find_or_add_like(node_one, &high.vertex, &low.vertex, complement_edge);
            Function {
                complement: high.complement,
                vertex,
            }
        } else {
            high
        }
    }

    /// Consensus of the high and low branches of a vertex: the part of the
    /// function independent of the vertex variable.
    pub(crate) fn consensus(&mut self, vertex: &VertexPtr, complement: bool) -> Function {
        self.clear_tables();
        let (high, low, low_complement) = {
            let ite = vertex.as_ite();
            (
                ite.high().clone(),
                ite.low().clone(),
                ite.complement_edge() ^ complement,
            )
        };
        self.apply(Connective::And, &high, &low, complement, low_complement)
    }

    /// Counts the if-then-else vertices reachable from a vertex.
    ///
    /// Vertex marks must be clear before the call.
    pub fn count_ite_nodes(&self, vertex: &VertexPtr) -> i32 {
        if vertex.terminal() {
            return 0;
        }
        let ite = vertex.as_ite();
        if ite.mark() {
            return 0;
        }
        ite.set_mark(true);
        let mut in_module = 0;
        if ite.module() {
            let module = self
                .modules
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            in_module = self.count_ite_nodes(&module.vertex);
        }
        1 + in_module
            + self.count_ite_nodes(&ite.high().clone())
            + self.count_ite_nodes(&ite.low().clone())
    }

    /// Verifies the ordering and reduction invariants of the diagram.
    ///
    /// Violations are programming errors and abort through assertions.
    fn test_structure(&self, vertex: &VertexPtr) {
        if vertex.terminal() {
            return;
        }
        let ite = vertex.as_ite();
        if ite.mark() {
            return;
        }
        ite.set_mark(true);
        debug_assert!(ite.index() > 0, "Illegal index for a node.");
        debug_assert!(ite.order() > 0, "Improper order for nodes.");
        debug_assert!(
            ite.complement_edge() || ite.high().id() != ite.low().id(),
            "Reduction rule failure."
        );
        debug_assert!(
            ite.high().terminal() || ite.order() < ite.high().as_ite().order(),
            "Ordering of nodes failed."
        );
        debug_assert!(
            ite.low().terminal() || ite.order() < ite.low().as_ite().order(),
            "Ordering of nodes failed."
        );
        if ite.module() {
            let module = self
                .modules
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            debug_assert!(
                !module.vertex.terminal(),
                "Terminal modules must be removed."
            );
            self.test_structure(&module.vertex);
        }
        self.test_structure(&ite.high().clone());
        self.test_structure(&ite.low().clone());
    }

    /// Clears the Apply memoization tables.
    pub(crate) fn clear_tables(&mut self) {
        self.and_table.clear();
        self.or_table.clear();
    }

    /// Releases the unique and compute tables once the diagram is final.
    pub(crate) fn freeze(&mut self) {
        self.unique_table.release();
        self.and_table = PairTable::default();
        self.or_table = PairTable::default();
    }
}
