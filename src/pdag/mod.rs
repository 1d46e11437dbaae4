//! Propositional directed acyclic graph (PDAG)
//!
//! The PDAG is the indexed working representation of a fault tree. Model
//! elements become [`Variable`]s and [`Gate`]s with signed argument indices;
//! the sign of an index encodes complement. Index 1 is reserved for the
//! single Boolean constant TRUE of the graph (FALSE is -1), variables occupy
//! the contiguous block starting at [`VARIABLE_START_INDEX`], and gate
//! indices begin above that block.
//!
//! Gates absorb constant, duplicate, and complement arguments eagerly
//! according to their Boolean logic, so graph rewrites stay local. The
//! [`preprocessor`] module hosts the global passes (normalization,
//! complement propagation, module detection, ordering).

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ValidityError;
use crate::model::{self, ArgEvent, Model};

mod display;
pub mod preprocessor;
#[cfg(test)]
mod tests;

/// The reserved index of the graph's Boolean constant TRUE.
pub const CONSTANT_INDEX: i32 = 1;

/// The first index of the contiguous variable block.
pub const VARIABLE_START_INDEX: i32 = 2;

/// Shared gates of the graph.
pub type GatePtr = Rc<RefCell<Gate>>;
/// Acyclic pointers to parent gates.
pub type GateWeak = Weak<RefCell<Gate>>;
/// Shared Boolean variables.
pub type VariablePtr = Rc<Variable>;
/// The shared Boolean constant of the graph.
pub type ConstantPtr = Rc<Constant>;

/// Boolean connectives of PDAG gates.
///
/// After normalization the only connectives remaining in the graph are
/// `And` and `Or`, plus `Null` pass-throughs awaiting removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// Simple AND gate.
    And,
    /// Simple OR gate.
    Or,
    /// At-least-k-of-n gate.
    Atleast,
    /// Exclusive OR with exactly two arguments.
    Xor,
    /// Boolean negation with exactly one argument.
    Not,
    /// Negated AND gate.
    Nand,
    /// Negated OR gate.
    Nor,
    /// Pass-through gate with exactly one argument.
    Null,
}

/// Common state of PDAG nodes: index, order, visit times, and weak parents.
pub struct NodeBase {
    index: i32,
    order: Cell<i32>,
    visits: Cell<[i32; 3]>,
    pos_count: Cell<i32>,
    neg_count: Cell<i32>,
    parents: RefCell<Vec<(i32, GateWeak)>>,
}

impl NodeBase {
    fn new(index: i32) -> Self {
        NodeBase {
            index,
            order: Cell::new(0),
            visits: Cell::new([0; 3]),
            pos_count: Cell::new(0),
            neg_count: Cell::new(0),
            parents: RefCell::new(Vec::new()),
        }
    }

    /// The unique index of this node within its graph.
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The assigned topological order of this node.
    pub fn order(&self) -> i32 {
        self.order.get()
    }

    /// Sets the topological order.
    pub fn set_order(&self, value: i32) {
        self.order.set(value);
    }

    /// Registers a visit time; returns true if the node had already been
    /// entered and exited before this call.
    pub fn visit(&self, time: i32) -> bool {
        debug_assert!(time > 0);
        let mut visits = self.visits.get();
        if visits[0] == 0 {
            visits[0] = time;
        } else if visits[1] == 0 {
            visits[1] = time;
        } else {
            visits[2] = time;
            self.visits.set(visits);
            return true;
        }
        self.visits.set(visits);
        false
    }

    /// Registers a leaf visit: the first call stamps both the enter and
    /// exit slots, later calls move only the exit slot.
    pub fn visit_leaf(&self, time: i32) {
        let mut visits = self.visits.get();
        if visits[0] == 0 {
            visits[0] = time;
        }
        visits[1] = time;
        self.visits.set(visits);
    }

    /// The first (enter) visit time; 0 when never visited.
    pub fn enter_time(&self) -> i32 {
        self.visits.get()[0]
    }

    /// The second (exit) visit time; 0 when not exited.
    pub fn exit_time(&self) -> i32 {
        self.visits.get()[1]
    }

    /// The time of the latest registered visit.
    pub fn last_visit(&self) -> i32 {
        let visits = self.visits.get();
        if visits[2] != 0 {
            visits[2]
        } else {
            visits[1]
        }
    }

    /// True if this node was visited more than entered-and-exited.
    pub fn revisited(&self) -> bool {
        self.visits.get()[2] != 0
    }

    /// True if this node was visited at least once.
    pub fn visited(&self) -> bool {
        self.visits.get()[0] != 0
    }

    /// Resets the visit times to zero.
    pub fn clear_visits(&self) {
        self.visits.set([0; 3]);
    }

    /// The number of occurrences as a positive argument.
    pub fn pos_count(&self) -> i32 {
        self.pos_count.get()
    }

    /// The number of occurrences as a complemented argument.
    pub fn neg_count(&self) -> i32 {
        self.neg_count.get()
    }

    /// Counts one more occurrence of this node as an argument.
    pub fn add_count(&self, positive: bool) {
        if positive {
            self.pos_count.set(self.pos_count.get() + 1);
        } else {
            self.neg_count.set(self.neg_count.get() + 1);
        }
    }

    /// Resets the occurrence counters.
    pub fn reset_count(&self) {
        self.pos_count.set(0);
        self.neg_count.set(0);
    }

    /// The number of live parent gates.
    pub fn parents_len(&self) -> usize {
        self.parents
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    fn add_parent(&self, index: i32, gate: GateWeak) {
        debug_assert!(
            !self.parents.borrow().iter().any(|(i, _)| *i == index),
            "Adding an existing parent."
        );
        self.parents.borrow_mut().push((index, gate));
    }

    fn erase_parent(&self, index: i32) {
        let mut parents = self.parents.borrow_mut();
        let position = parents.iter().position(|(i, _)| *i == index);
        debug_assert!(position.is_some(), "No parent with the given index.");
        if let Some(position) = position {
            parents.swap_remove(position);
        }
    }

    fn first_live_parent(&self) -> Option<GatePtr> {
        self.parents
            .borrow()
            .iter()
            .find_map(|(_, weak)| weak.upgrade())
    }
}

/// A Boolean variable of the graph; maps back to a basic event.
pub struct Variable {
    base: NodeBase,
}

impl std::ops::Deref for Variable {
    type Target = NodeBase;

    fn deref(&self) -> &NodeBase {
        &self.base
    }
}

/// The single Boolean constant TRUE of a graph, always at index 1.
pub struct Constant {
    base: NodeBase,
}

impl Constant {
    /// The constant Boolean value.
    pub fn value(&self) -> bool {
        true
    }
}

impl std::ops::Deref for Constant {
    type Target = NodeBase;

    fn deref(&self) -> &NodeBase {
        &self.base
    }
}

/// An argument node of a gate.
#[derive(Clone)]
pub enum NodeArg {
    /// A child gate.
    Gate(GatePtr),
    /// A Boolean variable.
    Variable(VariablePtr),
    /// The graph constant.
    Constant(ConstantPtr),
}

impl NodeArg {
    fn index(&self) -> i32 {
        match self {
            NodeArg::Gate(gate) => gate.borrow().index(),
            NodeArg::Variable(var) => var.index(),
            NodeArg::Constant(constant) => constant.index(),
        }
    }

    fn add_parent(&self, index: i32, gate: GateWeak) {
        match self {
            NodeArg::Gate(child) => child.borrow().base.add_parent(index, gate),
            NodeArg::Variable(var) => var.base.add_parent(index, gate),
            NodeArg::Constant(constant) => constant.base.add_parent(index, gate),
        }
    }
}

/// An indexed gate of the PDAG.
///
/// A gate may carry any connective after construction, but only `And` and
/// `Or` survive normalization. Argument manipulation keeps the gate's
/// Boolean invariants by absorbing constants, duplicates, and complements.
pub struct Gate {
    base: NodeBase,
    connective: Connective,
    mark: bool,
    module: bool,
    coherent: bool,
    min_number: i32,
    min_time: i32,
    max_time: i32,
    args: BTreeSet<i32>,
    gate_args: Vec<(i32, GatePtr)>,
    variable_args: Vec<(i32, VariablePtr)>,
    constant: Option<ConstantPtr>,
}

impl Gate {
    /// Creates a new gate within the graph.
    pub fn new(connective: Connective, graph: &Pdag) -> GatePtr {
        Rc::new(RefCell::new(Gate {
            base: NodeBase::new(graph.next_index()),
            connective,
            mark: false,
            module: false,
            coherent: false,
            min_number: 0,
            min_time: 0,
            max_time: 0,
            args: BTreeSet::new(),
            gate_args: Vec::new(),
            variable_args: Vec::new(),
            constant: None,
        }))
    }

    /// The unique index of this gate.
    pub fn index(&self) -> i32 {
        self.base.index()
    }

    /// Common node state (order, visits, counts, parents).
    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    /// The connective of this gate.
    pub fn connective(&self) -> Connective {
        self.connective
    }

    /// Changes the logic of this gate.
    pub fn set_connective(&mut self, connective: Connective) {
        self.connective = connective;
    }

    /// The min number of an at-least gate.
    pub fn min_number(&self) -> i32 {
        self.min_number
    }

    /// Sets the min number for an at-least gate.
    pub fn set_min_number(&mut self, number: i32) {
        self.min_number = number;
    }

    /// True if this gate has collapsed to a Boolean constant.
    pub fn constant(&self) -> bool {
        self.constant.is_some()
    }

    /// The state of a constant gate: true for Unity, false for Null set.
    ///
    /// Meaningful only when [`Gate::constant`] is true.
    pub fn constant_state(&self) -> bool {
        debug_assert!(self.constant.is_some());
        *self.args.iter().next().expect("Constant gate without args") > 0
    }

    /// The traversal mark of this gate.
    pub fn mark(&self) -> bool {
        self.mark
    }

    /// Sets the traversal mark.
    pub fn set_mark(&mut self, flag: bool) {
        self.mark = flag;
    }

    /// True if this gate roots an independent sub-graph.
    pub fn module(&self) -> bool {
        self.module
    }

    /// Flags this gate as a module root.
    pub fn set_module(&mut self, flag: bool) {
        self.module = flag;
    }

    /// True if the sub-graph of this gate carries no complements.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// Sets the coherence flag.
    pub fn set_coherent(&mut self, flag: bool) {
        self.coherent = flag;
    }

    /// The minimum visit time of this gate's sub-graph.
    pub fn min_time(&self) -> i32 {
        self.min_time
    }

    /// The maximum visit time of this gate's sub-graph.
    pub fn max_time(&self) -> i32 {
        self.max_time
    }

    /// Stores the visit-time interval of this gate's sub-graph.
    pub fn set_times(&mut self, min_time: i32, max_time: i32) {
        self.min_time = min_time;
        self.max_time = max_time;
    }

    /// The ordered set of signed argument indices.
    pub fn args(&self) -> &BTreeSet<i32> {
        &self.args
    }

    /// The gate-typed arguments with their signed indices.
    pub fn gate_args(&self) -> &[(i32, GatePtr)] {
        &self.gate_args
    }

    /// The variable-typed arguments with their signed indices.
    pub fn variable_args(&self) -> &[(i32, VariablePtr)] {
        &self.variable_args
    }

    /// The sign of an existing argument node.
    pub fn arg_sign(&self, node_index: i32) -> i32 {
        debug_assert!(node_index > 0);
        if self.args.contains(&node_index) {
            1
        } else {
            debug_assert!(self.args.contains(&-node_index), "Invalid argument.");
            -1
        }
    }

    /// Adds an argument node to a gate, absorbing constants, duplicates,
    /// and complements according to the gate's logic.
    ///
    /// The gate may change its connective or collapse to a constant as a
    /// side effect; the caller must re-inspect the gate when it matters.
    pub fn add_arg(gate: &GatePtr, graph: &Pdag, index: i32, arg: NodeArg) {
        debug_assert!(index != 0);
        debug_assert_eq!(index.abs(), arg.index());
        if gate.borrow().constant() {
            // A collapsed gate dominates its remaining arguments: TRUE
            // absorbs the rest of an OR, FALSE the rest of an AND.
            return;
        }
        if let NodeArg::Constant(constant) = &arg {
            debug_assert!(constant.value());
            Gate::add_constant_arg(gate, graph, index > 0);
            return;
        }
        {
            let g = gate.borrow();
            debug_assert!(
                !((g.connective == Connective::Not || g.connective == Connective::Null)
                    && !g.args.is_empty()),
                "Single-argument gate already has an argument."
            );
            debug_assert!(
                !(g.connective == Connective::Xor && g.args.len() > 1),
                "XOR gate already has two arguments."
            );
            if g.args.contains(&index) {
                drop(g);
                Gate::process_duplicate_arg(gate, graph, index);
                return;
            }
            if g.args.contains(&-index) {
                drop(g);
                Gate::process_complement_arg(gate, graph, index);
                return;
            }
        }
        let gate_index = {
            let mut g = gate.borrow_mut();
            g.args.insert(index);
            match &arg {
                NodeArg::Gate(child) => g.gate_args.push((index, child.clone())),
                NodeArg::Variable(var) => g.variable_args.push((index, var.clone())),
                NodeArg::Constant(_) => unreachable!(),
            }
            g.index()
        };
        arg.add_parent(gate_index, Rc::downgrade(gate));
    }

    /// Absorbs a Boolean constant argument using the gate's truth table.
    fn add_constant_arg(gate: &GatePtr, graph: &Pdag, state: bool) {
        let connective = gate.borrow().connective;
        use Connective::*;
        if state {
            match connective {
                Null | Or => Gate::make_constant(gate, graph, true),
                Nor | Not => Gate::make_constant(gate, graph, false),
                Nand => Gate::reduce_logic(gate, Not, 1),
                And => Gate::reduce_logic(gate, Null, 1),
                Xor => {
                    // TRUE flips the other argument.
                    gate.borrow_mut().set_connective(Not);
                }
                Atleast => {
                    // (K - 1) / (N - 1)
                    debug_assert!(gate.borrow().min_number > 0);
                    let min_number = {
                        let mut g = gate.borrow_mut();
                        g.min_number -= 1;
                        g.min_number
                    };
                    if min_number == 0 {
                        Gate::make_constant(gate, graph, true);
                    } else if min_number == 1 {
                        gate.borrow_mut().set_connective(Or);
                    }
                }
            }
        } else {
            match connective {
                Null | And => Gate::make_constant(gate, graph, false),
                Nand | Not => Gate::make_constant(gate, graph, true),
                Nor => Gate::reduce_logic(gate, Not, 1),
                Or => Gate::reduce_logic(gate, Null, 1),
                Xor => {
                    // FALSE passes the other argument through.
                    gate.borrow_mut().set_connective(Null);
                }
                Atleast => {
                    // K / (N - 1)
                    let min_number = gate.borrow().min_number;
                    Gate::reduce_logic(gate, And, min_number as usize);
                }
            }
        }
    }

    /// Downgrades the logic when the argument count reaches the threshold.
    ///
    /// A gate whose arguments are still being collected may be below the
    /// threshold; the downgrade waits for the remaining arguments.
    fn reduce_logic(gate: &GatePtr, target: Connective, num_args: usize) {
        let mut g = gate.borrow_mut();
        if !g.args.is_empty() && g.args.len() == num_args {
            g.set_connective(target);
        }
    }

    /// Handles the addition of an argument that already exists in the gate.
    fn process_duplicate_arg(gate: &GatePtr, graph: &Pdag, index: i32) {
        let connective = gate.borrow().connective;
        debug_assert!(connective != Connective::Not && connective != Connective::Null);
        if connective == Connective::Atleast {
            Gate::process_atleast_duplicate_arg(gate, graph, index);
            return;
        }
        if gate.borrow().args.len() == 1 {
            match connective {
                Connective::And | Connective::Or => gate.borrow_mut().set_connective(Connective::Null),
                Connective::Nand | Connective::Nor => {
                    gate.borrow_mut().set_connective(Connective::Not)
                }
                Connective::Xor => Gate::make_constant(gate, graph, false),
                _ => unreachable!("NOT and NULL gates cannot have duplicates."),
            }
        }
    }

    /// Duplicate argument of an at-least gate:
    /// `@(k, [x, x, y..]) = x & @(k-2, [y..]) | @(k, [y..])`.
    fn process_atleast_duplicate_arg(gate: &GatePtr, graph: &Pdag, index: i32) {
        let (min_number, num_args) = {
            let g = gate.borrow();
            (g.min_number, g.args.len())
        };
        debug_assert!(min_number > 1);
        debug_assert!(num_args >= min_number as usize);
        if num_args == 2 {
            // @(2, [x, x, z]) = x: drop the other argument.
            debug_assert_eq!(min_number, 2);
            let other = *gate
                .borrow()
                .args
                .iter()
                .find(|&&i| i != index)
                .expect("Two arguments expected.");
            Gate::erase_arg(gate, other);
            gate.borrow_mut().set_connective(Connective::Null);
            return;
        }
        if min_number as usize == num_args {
            // @(k, [y..]) over n-1 < k arguments is the empty set:
            // the whole gate becomes x & @(k-2, [y..]).
            debug_assert!(min_number > 2, "Corrupted number of gate arguments.");
            let clone_two = Gate::clone_gate(gate, graph);
            clone_two.borrow_mut().set_min_number(min_number - 2);
            Gate::erase_args(gate);
            gate.borrow_mut().set_connective(Connective::And);
            Gate::transfer_arg(&clone_two, graph, index, gate);
            if clone_two.borrow().min_number == 1 {
                clone_two.borrow_mut().set_connective(Connective::Or);
            }
            let clone_index = clone_two.borrow().index();
            Gate::add_arg(gate, graph, clone_index, NodeArg::Gate(clone_two));
            return;
        }
        debug_assert!(num_args > 2);
        let clone_one = Gate::clone_gate(gate, graph); // @(k, [y..])

        Gate::erase_args(gate);
        gate.borrow_mut().set_connective(Connective::Or);
        let clone_one_index = clone_one.borrow().index();
        Gate::add_arg(gate, graph, clone_one_index, NodeArg::Gate(clone_one.clone()));
        if min_number == 2 {
            Gate::transfer_arg(&clone_one, graph, index, gate);
            debug_assert_eq!(gate.borrow().args.len(), 2);
        } else {
            let and_gate = Gate::new(Connective::And, graph);
            let and_index = and_gate.borrow().index();
            Gate::add_arg(gate, graph, and_index, NodeArg::Gate(and_gate.clone()));
            Gate::transfer_arg(&clone_one, graph, index, &and_gate);

            let clone_two = Gate::clone_gate(&clone_one, graph);
            clone_two.borrow_mut().set_min_number(min_number - 2);
            if clone_two.borrow().min_number == 1 {
                clone_two.borrow_mut().set_connective(Connective::Or);
            }
            let clone_two_index = clone_two.borrow().index();
            Gate::add_arg(&and_gate, graph, clone_two_index, NodeArg::Gate(clone_two));

            debug_assert_eq!(and_gate.borrow().args.len(), 2);
            debug_assert_eq!(gate.borrow().args.len(), 2);
        }
        let (clone_args, clone_min) = {
            let c = clone_one.borrow();
            (c.args.len(), c.min_number as usize)
        };
        debug_assert!(clone_min <= clone_args);
        if clone_args == clone_min {
            clone_one.borrow_mut().set_connective(Connective::And);
        }
    }

    /// Handles the addition of a complement of an existing argument.
    fn process_complement_arg(gate: &GatePtr, graph: &Pdag, index: i32) {
        let connective = gate.borrow().connective;
        debug_assert!(connective != Connective::Not && connective != Connective::Null);
        debug_assert!(gate.borrow().args.contains(&-index));
        match connective {
            Connective::Nor | Connective::And => Gate::make_constant(gate, graph, false),
            Connective::Nand | Connective::Xor | Connective::Or => {
                Gate::make_constant(gate, graph, true)
            }
            Connective::Atleast => {
                // @(k, [x, x', y..]) = @(k-1, [y..])
                Gate::erase_arg(gate, -index);
                let mut g = gate.borrow_mut();
                g.min_number -= 1;
                if g.min_number == 0 {
                    drop(g);
                    Gate::make_constant(gate, graph, true);
                } else if g.args.len() == 1 {
                    g.set_connective(Connective::Null);
                } else if g.min_number == 1 {
                    g.set_connective(Connective::Or);
                } else if !g.args.is_empty() && g.min_number as usize == g.args.len() {
                    g.set_connective(Connective::And);
                }
            }
            _ => unreachable!("Unexpected gate type for complement arg processing."),
        }
    }

    /// Clones the semantics of a gate (arguments and parameters), not its
    /// index or parents.
    pub fn clone_gate(gate: &GatePtr, graph: &Pdag) -> GatePtr {
        let g = gate.borrow();
        debug_assert!(!g.constant() && g.connective != Connective::Null);
        let clone = Rc::new(RefCell::new(Gate {
            base: NodeBase::new(graph.next_index()),
            connective: g.connective,
            mark: false,
            module: false,
            coherent: g.coherent,
            min_number: g.min_number,
            min_time: 0,
            max_time: 0,
            args: g.args.clone(),
            gate_args: g.gate_args.clone(),
            variable_args: g.variable_args.clone(),
            constant: g.constant.clone(),
        }));
        drop(g);
        let clone_index = clone.borrow().index();
        let (gate_args, variable_args, constant) = {
            let c = clone.borrow();
            (c.gate_args.clone(), c.variable_args.clone(), c.constant.clone())
        };
        for (_, child) in &gate_args {
            child.borrow().base.add_parent(clone_index, Rc::downgrade(&clone));
        }
        for (_, var) in &variable_args {
            var.base.add_parent(clone_index, Rc::downgrade(&clone));
        }
        if let Some(constant) = &constant {
            constant.base.add_parent(clone_index, Rc::downgrade(&clone));
        }
        clone
    }

    /// Transfers an argument of this gate to another gate.
    pub fn transfer_arg(gate: &GatePtr, graph: &Pdag, index: i32, recipient: &GatePtr) {
        debug_assert!(index != 0);
        let gate_index = gate.borrow().index();
        let arg = Gate::take_arg(gate, index);
        match &arg {
            NodeArg::Gate(child) => child.borrow().base.erase_parent(gate_index),
            NodeArg::Variable(var) => var.base.erase_parent(gate_index),
            NodeArg::Constant(_) => unreachable!("No constant arguments expected."),
        }
        Gate::add_arg(recipient, graph, index, arg);
    }

    /// Shares an argument of this gate with another gate.
    pub fn share_arg(gate: &GatePtr, graph: &Pdag, index: i32, recipient: &GatePtr) {
        debug_assert!(index != 0);
        let arg = {
            let g = gate.borrow();
            debug_assert!(g.args.contains(&index));
            if let Some((_, child)) = g.gate_args.iter().find(|(i, _)| *i == index) {
                NodeArg::Gate(child.clone())
            } else {
                let (_, var) = g
                    .variable_args
                    .iter()
                    .find(|(i, _)| *i == index)
                    .expect("Argument is neither a gate nor a variable.");
                NodeArg::Variable(var.clone())
            }
        };
        Gate::add_arg(recipient, graph, index, arg);
    }

    /// Removes an argument entry, returning the argument node.
    fn take_arg(gate: &GatePtr, index: i32) -> NodeArg {
        let mut g = gate.borrow_mut();
        debug_assert!(g.args.contains(&index));
        g.args.remove(&index);
        if let Some(position) = g.gate_args.iter().position(|(i, _)| *i == index) {
            let (_, child) = g.gate_args.remove(position);
            NodeArg::Gate(child)
        } else {
            let position = g
                .variable_args
                .iter()
                .position(|(i, _)| *i == index)
                .expect("Argument is neither a gate nor a variable.");
            let (_, var) = g.variable_args.remove(position);
            NodeArg::Variable(var)
        }
    }

    /// Makes all arguments complements of themselves (De Morgan helper).
    pub fn negate_args(gate: &GatePtr) {
        let mut g = gate.borrow_mut();
        let inverted: BTreeSet<i32> = g.args.iter().map(|i| -i).collect();
        g.args = inverted;
        for arg in &mut g.gate_args {
            arg.0 = -arg.0;
        }
        for arg in &mut g.variable_args {
            arg.0 = -arg.0;
        }
    }

    /// Replaces an argument with its complement.
    pub fn negate_arg(gate: &GatePtr, existing_arg: i32) {
        let mut g = gate.borrow_mut();
        debug_assert!(g.args.contains(&existing_arg));
        debug_assert!(!g.args.contains(&-existing_arg));
        g.args.remove(&existing_arg);
        g.args.insert(-existing_arg);
        if let Some(arg) = g.gate_args.iter_mut().find(|(i, _)| *i == existing_arg) {
            arg.0 = -arg.0;
        } else if let Some(arg) = g
            .variable_args
            .iter_mut()
            .find(|(i, _)| *i == existing_arg)
        {
            arg.0 = -arg.0;
        }
    }

    /// Adds the arguments of an argument gate to this gate (coalescing);
    /// the argument gate itself is removed from the arguments.
    pub fn coalesce_gate(gate: &GatePtr, graph: &Pdag, arg_gate: &GatePtr) {
        let arg_index = arg_gate.borrow().index();
        debug_assert!(gate.borrow().args.contains(&arg_index), "Cannot join complement gate.");
        debug_assert!(!arg_gate.borrow().constant(), "Impossible to join.");
        let (gate_args, variable_args) = {
            let a = arg_gate.borrow();
            (a.gate_args.clone(), a.variable_args.clone())
        };
        for (index, child) in gate_args {
            Gate::add_arg(gate, graph, index, NodeArg::Gate(child));
            if gate.borrow().constant() {
                return;
            }
        }
        for (index, var) in variable_args {
            Gate::add_arg(gate, graph, index, NodeArg::Variable(var));
            if gate.borrow().constant() {
                return;
            }
        }
        let gate_index = gate.borrow().index();
        let mut g = gate.borrow_mut();
        g.args.remove(&arg_index);
        if let Some(position) = g.gate_args.iter().position(|(i, _)| *i == arg_index) {
            g.gate_args.remove(position);
        }
        drop(g);
        arg_gate.borrow().base.erase_parent(gate_index);
    }

    /// Swaps a pass-through argument gate with its single argument,
    /// carrying the sign of the pass-through edge.
    pub fn join_null_gate(gate: &GatePtr, graph: &Pdag, index: i32) {
        debug_assert!(index != 0);
        let gate_index = gate.borrow().index();
        let null_gate = {
            let mut g = gate.borrow_mut();
            debug_assert!(g.args.contains(&index));
            g.args.remove(&index);
            let position = g
                .gate_args
                .iter()
                .position(|(i, _)| *i == index)
                .expect("Pass-through argument must be a gate.");
            let (_, null_gate) = g.gate_args.remove(position);
            null_gate
        };
        null_gate.borrow().base.erase_parent(gate_index);

        let n = null_gate.borrow();
        debug_assert_eq!(n.connective, Connective::Null);
        debug_assert_eq!(n.args.len(), 1);
        let mut arg_index = *n.args.iter().next().expect("Null gate without arguments.");
        arg_index *= index.signum();
        let arg = if let Some((_, child)) = n.gate_args.first() {
            NodeArg::Gate(child.clone())
        } else if let Some((_, var)) = n.variable_args.first() {
            NodeArg::Variable(var.clone())
        } else {
            NodeArg::Constant(n.constant.clone().expect("Corrupted pass-through gate."))
        };
        drop(n);
        Gate::add_arg(gate, graph, arg_index, arg);
    }

    /// Removes an argument from the gate.
    ///
    /// The gate may be left with one or zero arguments, which the caller
    /// must repair.
    pub fn erase_arg(gate: &GatePtr, index: i32) {
        debug_assert!(index != 0);
        let gate_index = gate.borrow().index();
        let mut g = gate.borrow_mut();
        debug_assert!(g.args.contains(&index));
        g.args.remove(&index);
        if let Some(position) = g.gate_args.iter().position(|(i, _)| *i == index) {
            let (_, child) = g.gate_args.remove(position);
            drop(g);
            child.borrow().base.erase_parent(gate_index);
        } else if let Some(position) = g.variable_args.iter().position(|(i, _)| *i == index) {
            let (_, var) = g.variable_args.remove(position);
            drop(g);
            var.base.erase_parent(gate_index);
        } else {
            let constant = g.constant.take().expect("Corrupted gate arguments.");
            drop(g);
            constant.base.erase_parent(gate_index);
        }
    }

    /// Removes all arguments of the gate.
    pub fn erase_args(gate: &GatePtr) {
        let gate_index = gate.borrow().index();
        let mut g = gate.borrow_mut();
        g.args.clear();
        let gate_args = std::mem::take(&mut g.gate_args);
        let variable_args = std::mem::take(&mut g.variable_args);
        let constant = g.constant.take();
        drop(g);
        for (_, child) in gate_args {
            child.borrow().base.erase_parent(gate_index);
        }
        for (_, var) in variable_args {
            var.base.erase_parent(gate_index);
        }
        if let Some(constant) = constant {
            constant.base.erase_parent(gate_index);
        }
    }

    /// Turns the gate into a pass-through of the graph constant.
    ///
    /// This transition is one-way for the lifetime of the gate.
    pub fn make_constant(gate: &GatePtr, graph: &Pdag, state: bool) {
        debug_assert!(!gate.borrow().constant());
        Gate::erase_args(gate);
        let gate_index = gate.borrow().index();
        let constant = graph.constant();
        {
            let mut g = gate.borrow_mut();
            g.set_connective(Connective::Null);
            let index = if state {
                constant.index()
            } else {
                -constant.index()
            };
            g.args.insert(index);
            g.constant = Some(constant.clone());
        }
        constant.base.add_parent(gate_index, Rc::downgrade(gate));
    }
}

/// Propositional directed acyclic graph of an indexed fault tree.
///
/// The graph owns the single Boolean constant and tracks the mapping from
/// variable indices to the originating basic events.
pub struct Pdag {
    node_index: Cell<i32>,
    complement: Cell<bool>,
    coherent: Cell<bool>,
    normal: Cell<bool>,
    root: RefCell<Option<GatePtr>>,
    constant: ConstantPtr,
    basic_events: Vec<model::BasicEvent>,
    variables: Vec<VariablePtr>,
}

impl Pdag {
    /// Converts a model gate into a PDAG.
    ///
    /// Variables receive the contiguous index block
    /// `[VARIABLE_START_INDEX, VARIABLE_START_INDEX + n)` before any gate
    /// is indexed. When `ccf` is set, basic events carrying a CCF proxy
    /// gate are substituted by that gate.
    pub fn new(model: &Model, top: &str, ccf: bool) -> Result<Pdag, ValidityError> {
        let top_formula = model
            .gate(top)
            .ok_or_else(|| ValidityError::UnknownReference { id: top.to_string() })?;

        let node_index = Cell::new(0);
        let constant = Rc::new(Constant {
            base: NodeBase::new({
                node_index.set(node_index.get() + 1);
                node_index.get()
            }),
        });
        debug_assert_eq!(constant.index(), CONSTANT_INDEX);

        let mut builder = GraphBuilder {
            model,
            ccf,
            node_index: &node_index,
            variables: FxHashMap::default(),
            variable_list: Vec::new(),
            basic_events: Vec::new(),
            gathered_gates: FxHashSet::default(),
        };
        builder.gather_variables(top_formula)?;

        let graph = Pdag {
            node_index: node_index.clone(),
            complement: Cell::new(false),
            coherent: Cell::new(true),
            normal: Cell::new(true),
            root: RefCell::new(None),
            constant,
            basic_events: std::mem::take(&mut builder.basic_events),
            variables: std::mem::take(&mut builder.variable_list),
        };

        let mut constructor = GateConstructor {
            model,
            ccf,
            graph: &graph,
            variables: builder.variables,
            gates: FxHashMap::default(),
        };
        let root = constructor.construct_gate_by_id(top)?;
        *graph.root.borrow_mut() = Some(root);
        Ok(graph)
    }

    fn next_index(&self) -> i32 {
        self.node_index.set(self.node_index.get() + 1);
        self.node_index.get()
    }

    /// The highest node index handed out so far.
    pub fn node_index_bound(&self) -> i32 {
        self.node_index.get()
    }

    /// The root gate of the graph.
    pub fn root(&self) -> GatePtr {
        self.root
            .borrow()
            .clone()
            .expect("The graph is fully constructed.")
    }

    /// Replaces the root gate.
    pub fn set_root(&self, gate: GatePtr) {
        *self.root.borrow_mut() = Some(gate);
    }

    /// True if the graph represents the complement of its root.
    pub fn complement(&self) -> bool {
        self.complement.get()
    }

    /// Sets the complement interpretation of the graph.
    pub fn set_complement(&self, flag: bool) {
        self.complement.set(flag);
    }

    /// True if the graph contains no complements or non-coherent gates.
    pub fn coherent(&self) -> bool {
        self.coherent.get()
    }

    pub(crate) fn set_coherent(&self, flag: bool) {
        self.coherent.set(flag);
    }

    /// True if all gates are already AND/OR.
    pub fn normal(&self) -> bool {
        self.normal.get()
    }

    pub(crate) fn set_normal(&self, flag: bool) {
        self.normal.set(flag);
    }

    /// The single Boolean constant TRUE of this graph.
    pub fn constant(&self) -> &ConstantPtr {
        &self.constant
    }

    /// The basic events backing the variable index block, in index order.
    pub fn basic_events(&self) -> &[model::BasicEvent] {
        &self.basic_events
    }

    /// The number of variables in the graph.
    pub fn num_variables(&self) -> usize {
        self.basic_events.len()
    }

    /// The basic event backing a variable index.
    pub fn basic_event(&self, variable_index: i32) -> &model::BasicEvent {
        &self.basic_events[(variable_index - VARIABLE_START_INDEX) as usize]
    }

    /// The variable node at the given index.
    pub fn variable(&self, variable_index: i32) -> &VariablePtr {
        &self.variables[(variable_index - VARIABLE_START_INDEX) as usize]
    }

    /// True if the graph is a trivial function: a constant or a single
    /// variable under the root pass-through.
    pub fn is_trivial(&self) -> bool {
        let root = self.root();
        let r = root.borrow();
        !self.complement.get() && r.connective == Connective::Null && r.gate_args.is_empty()
    }

    /// Attempts to reduce the graph to its trivial form.
    ///
    /// Returns true if the graph is trivial (already or after reduction).
    pub fn check_trivial(&self) -> bool {
        if self.root().borrow().connective != Connective::Null {
            return false;
        }
        self.remove_null_gates();

        let root = self.root();
        debug_assert_eq!(root.borrow().args.len(), 1);
        let child_entry = root.borrow().gate_args.first().cloned();
        if let Some((signed_index, child)) = child_entry {
            // Pull the child gate up to the root.
            let root_index = root.borrow().index();
            child.borrow().base.erase_parent(root_index);
            {
                let mut r = root.borrow_mut();
                r.args.clear();
                r.gate_args.clear();
            }
            self.set_root(child);
            self.set_complement(self.complement() ^ (signed_index < 0));
            return false;
        }
        // Single variable or constant argument.
        if self.complement.get() {
            Gate::negate_args(&root);
            self.complement.set(false);
        }
        let r = root.borrow();
        if !r.constant() {
            debug_assert_eq!(r.variable_args.len(), 1);
            r.variable_args[0].1.set_order(1);
        }
        debug_assert!(self.is_trivial());
        true
    }

    /// Removes pass-through gates, absorbing Boolean constants into parent
    /// gates by their truth-table rules.
    ///
    /// The pass repeats until no pass-through gate is left below the root.
    pub fn remove_null_gates(&self) {
        loop {
            let mut null_gates: Vec<GatePtr> = Vec::new();
            let root = self.root();
            let root_index = root.borrow().index();
            self.clear_gate_marks();
            traverse_gates(&root, true, &mut |gate| {
                let g = gate.borrow();
                if g.connective == Connective::Null && g.index() != root_index {
                    null_gates.push(gate.clone());
                }
            });
            self.clear_gate_marks();
            if null_gates.is_empty() {
                return;
            }
            for null_gate in null_gates {
                self.propagate_null_gate(&null_gate);
            }
        }
    }

    /// Propagates a pass-through gate into every parent.
    fn propagate_null_gate(&self, gate: &GatePtr) {
        debug_assert_eq!(gate.borrow().connective, Connective::Null);
        let gate_index = gate.borrow().index();
        loop {
            let parent = {
                let g = gate.borrow();
                g.base.first_live_parent()
            };
            let parent = match parent {
                Some(parent) => parent,
                None => break,
            };
            let sign = parent.borrow().arg_sign(gate_index);
            Gate::join_null_gate(&parent, self, sign * gate_index);
            let still_null = parent.borrow().connective == Connective::Null;
            if still_null && !Rc::ptr_eq(&parent, &self.root()) {
                self.propagate_null_gate(&parent);
            }
        }
    }

    /// Clears traversal marks of all gates.
    pub fn clear_gate_marks(&self) {
        clear_marks(&self.root());
    }

    /// Clears visit times of all nodes.
    pub fn clear_node_visits(&self) {
        self.clear_gate_marks();
        let root = self.root();
        traverse_nodes(&root, &mut |node| match node {
            NodeRef::Gate(gate) => gate.borrow().base.clear_visits(),
            NodeRef::Variable(var) => var.clear_visits(),
            NodeRef::Constant(constant) => constant.clear_visits(),
        });
        self.clear_gate_marks();
    }

    /// Clears topological orders of all nodes.
    pub fn clear_node_orders(&self) {
        self.clear_gate_marks();
        let root = self.root();
        traverse_nodes(&root, &mut |node| match node {
            NodeRef::Gate(gate) => gate.borrow().base.set_order(0),
            NodeRef::Variable(var) => var.set_order(0),
            NodeRef::Constant(constant) => constant.set_order(0),
        });
        self.clear_gate_marks();
    }

    /// Clears occurrence counts of all nodes.
    pub fn clear_node_counts(&self) {
        self.clear_gate_marks();
        let root = self.root();
        traverse_nodes(&root, &mut |node| match node {
            NodeRef::Gate(gate) => gate.borrow().base.reset_count(),
            NodeRef::Variable(var) => var.reset_count(),
            NodeRef::Constant(constant) => constant.reset_count(),
        });
        self.clear_gate_marks();
    }
}

/// A node reference handed to graph visitors.
pub enum NodeRef<'a> {
    /// A gate of the graph.
    Gate(&'a GatePtr),
    /// A variable leaf.
    Variable(&'a VariablePtr),
    /// The graph constant.
    Constant(&'a ConstantPtr),
}

/// Traverses gates depth-first, marking them with the given flag.
///
/// Gates already carrying the flag are skipped, so a pass with `true`
/// followed by a pass with `false` restores a clean state.
pub fn traverse_gates<F: FnMut(&GatePtr)>(gate: &GatePtr, mark: bool, visit: &mut F) {
    if gate.borrow().mark() == mark {
        return;
    }
    gate.borrow_mut().set_mark(mark);
    visit(gate);
    let children: Vec<GatePtr> = gate
        .borrow()
        .gate_args
        .iter()
        .map(|(_, child)| child.clone())
        .collect();
    for child in children {
        traverse_gates(&child, mark, visit);
    }
}

/// Clears gate marks unconditionally.
///
/// Rewrites may leave the graph partially marked, so the sweep tracks
/// visited gates by index instead of trusting the marks themselves.
fn clear_marks(gate: &GatePtr) {
    fn recurse(gate: &GatePtr, visited: &mut FxHashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        gate.borrow_mut().set_mark(false);
        let children: Vec<GatePtr> = gate
            .borrow()
            .gate_args
            .iter()
            .map(|(_, child)| child.clone())
            .collect();
        for child in children {
            recurse(&child, visited);
        }
    }
    let mut visited = FxHashSet::default();
    recurse(gate, &mut visited);
}

/// Traverses all nodes (gates, variables, constant) marking gates.
pub fn traverse_nodes<F: FnMut(NodeRef)>(gate: &GatePtr, visit: &mut F) {
    if gate.borrow().mark() {
        return;
    }
    gate.borrow_mut().set_mark(true);
    visit(NodeRef::Gate(gate));
    let (children, variables, constant) = {
        let g = gate.borrow();
        (
            g.gate_args.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>(),
            g.variable_args.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            g.constant.clone(),
        )
    };
    for child in &children {
        traverse_nodes(child, visit);
    }
    for var in &variables {
        visit(NodeRef::Variable(var));
    }
    if let Some(constant) = &constant {
        visit(NodeRef::Constant(constant));
    }
}

/// First pass of graph construction: discovers basic events depth-first so
/// variables take the contiguous low index block.
struct GraphBuilder<'a> {
    model: &'a Model,
    ccf: bool,
    node_index: &'a Cell<i32>,
    variables: FxHashMap<String, VariablePtr>,
    variable_list: Vec<VariablePtr>,
    basic_events: Vec<model::BasicEvent>,
    gathered_gates: FxHashSet<String>,
}

impl GraphBuilder<'_> {
    fn gather_variables(&mut self, formula: &model::Formula) -> Result<(), ValidityError> {
        for arg in formula.args() {
            match &arg.event {
                ArgEvent::Ref(id) => self.gather_reference(id)?,
                ArgEvent::Constant(_) => {}
                ArgEvent::Formula(nested) => self.gather_variables(nested)?,
            }
        }
        Ok(())
    }

    fn gather_reference(&mut self, id: &str) -> Result<(), ValidityError> {
        if let Some(event) = self.model.basic_event(id) {
            if self.ccf {
                if let Some(ccf_gate) = event.ccf_gate() {
                    return self.gather_gate(ccf_gate);
                }
            }
            if !self.variables.contains_key(id) {
                self.node_index.set(self.node_index.get() + 1);
                let var = Rc::new(Variable {
                    base: NodeBase::new(self.node_index.get()),
                });
                debug_assert_eq!(
                    var.index(),
                    VARIABLE_START_INDEX + self.basic_events.len() as i32
                );
                self.variables.insert(id.to_string(), var.clone());
                self.variable_list.push(var);
                self.basic_events.push(event.clone());
            }
            return Ok(());
        }
        if self.model.gate(id).is_some() {
            return self.gather_gate(id);
        }
        if self.model.house_event(id).is_some() {
            return Ok(());
        }
        Err(ValidityError::UnknownReference { id: id.to_string() })
    }

    fn gather_gate(&mut self, id: &str) -> Result<(), ValidityError> {
        if self.gathered_gates.insert(id.to_string()) {
            let formula = self
                .model
                .gate(id)
                .ok_or_else(|| ValidityError::UnknownReference { id: id.to_string() })?;
            self.gather_variables(formula)?;
        }
        Ok(())
    }
}

/// Construction state of a named gate: used for sharing and cycle detection.
enum GateState {
    UnderConstruction,
    Done(GatePtr),
}

/// Second pass of graph construction: builds indexed gates from formulas.
struct GateConstructor<'a> {
    model: &'a Model,
    ccf: bool,
    graph: &'a Pdag,
    variables: FxHashMap<String, VariablePtr>,
    gates: FxHashMap<String, GateState>,
}

impl GateConstructor<'_> {
    fn construct_formula(&mut self, formula: &model::Formula) -> Result<GatePtr, ValidityError> {
        use model::Connective as Mc;
        match formula.connective() {
            Mc::Iff => {
                // IFF(a, b) = NULL(~XOR(a, b))
                debug_assert_eq!(formula.args().len(), 2);
                self.graph.set_coherent(false);
                self.graph.set_normal(false);
                let parent = Gate::new(Connective::Null, self.graph);
                let xor_gate = Gate::new(Connective::Xor, self.graph);
                for arg in formula.args() {
                    self.add_formula_arg(&xor_gate, arg)?;
                }
                let index = xor_gate.borrow().index();
                Gate::add_arg(&parent, self.graph, -index, NodeArg::Gate(xor_gate));
                Ok(parent)
            }
            Mc::Imply => {
                // IMPLY(a, b) = OR(~a, b)
                debug_assert_eq!(formula.args().len(), 2);
                self.graph.set_coherent(false);
                let parent = Gate::new(Connective::Or, self.graph);
                let antecedent = &formula.args()[0];
                let consequent = &formula.args()[1];
                self.add_formula_arg_signed(&parent, antecedent, true)?;
                self.add_formula_arg(&parent, consequent)?;
                Ok(parent)
            }
            Mc::Cardinality => {
                // CARDINALITY(min, max) = ATLEAST(min) & ~ATLEAST(max + 1)
                // with the upper bound expressed over negated arguments.
                self.graph.set_coherent(false);
                self.graph.set_normal(false);
                let min = formula.min_number_value().unwrap_or(0);
                let max = formula.max_number_value().expect("Validated formula.");
                debug_assert!(min <= max && (max as usize) <= formula.args().len());
                let parent = Gate::new(Connective::And, self.graph);
                let first_arg = Gate::new(Connective::Atleast, self.graph);
                first_arg.borrow_mut().set_min_number(min);
                for arg in formula.args() {
                    self.add_formula_arg(&first_arg, arg)?;
                }
                let second_arg = Gate::clone_gate(&first_arg, self.graph);
                Gate::negate_args(&second_arg);
                second_arg
                    .borrow_mut()
                    .set_min_number(formula.args().len() as i32 - max);

                let well_form = |atleast: &GatePtr, graph: &Pdag| {
                    let (min_number, num_args) = {
                        let g = atleast.borrow();
                        (g.min_number(), g.args().len())
                    };
                    if min_number == 0 {
                        Gate::make_constant(atleast, graph, true);
                    } else if min_number == 1 {
                        atleast.borrow_mut().set_connective(Connective::Or);
                    } else if min_number as usize == num_args {
                        atleast.borrow_mut().set_connective(Connective::And);
                    }
                };
                well_form(&first_arg, self.graph);
                well_form(&second_arg, self.graph);

                let first_index = first_arg.borrow().index();
                Gate::add_arg(&parent, self.graph, first_index, NodeArg::Gate(first_arg));
                let second_index = second_arg.borrow().index();
                Gate::add_arg(&parent, self.graph, second_index, NodeArg::Gate(second_arg));
                Ok(parent)
            }
            simple => {
                let connective = match simple {
                    Mc::And => Connective::And,
                    Mc::Or => Connective::Or,
                    Mc::Atleast => Connective::Atleast,
                    Mc::Xor => Connective::Xor,
                    Mc::Not => Connective::Not,
                    Mc::Nand => Connective::Nand,
                    Mc::Nor => Connective::Nor,
                    Mc::Null => Connective::Null,
                    _ => unreachable!("Complex connectives handled above."),
                };
                if connective != Connective::And && connective != Connective::Or {
                    self.graph.set_normal(false);
                }
                match connective {
                    Connective::Not | Connective::Nand | Connective::Nor | Connective::Xor => {
                        self.graph.set_coherent(false)
                    }
                    _ => {}
                }
                let parent = Gate::new(connective, self.graph);
                if connective == Connective::Atleast {
                    parent
                        .borrow_mut()
                        .set_min_number(formula.min_number_value().expect("Validated formula."));
                }
                for arg in formula.args() {
                    self.add_formula_arg(&parent, arg)?;
                }
                self.repair_empty_gate(&parent);
                Ok(parent)
            }
        }
    }

    /// Collapses a gate whose arguments were all absorbed during
    /// construction into its Boolean identity element.
    fn repair_empty_gate(&self, gate: &GatePtr) {
        let connective = {
            let g = gate.borrow();
            if g.constant() || !g.args().is_empty() {
                return;
            }
            g.connective()
        };
        let state = match connective {
            Connective::And | Connective::Nor => true,
            Connective::Or | Connective::Nand | Connective::Xor => false,
            Connective::Atleast => gate.borrow().min_number() == 0,
            Connective::Not | Connective::Null => {
                unreachable!("Single-argument gates collapse through absorption.")
            }
        };
        Gate::make_constant(gate, self.graph, state);
    }

    fn add_formula_arg(
        &mut self,
        parent: &GatePtr,
        arg: &model::Arg,
    ) -> Result<(), ValidityError> {
        self.add_formula_arg_signed(parent, arg, false)
    }

    fn add_formula_arg_signed(
        &mut self,
        parent: &GatePtr,
        arg: &model::Arg,
        negate: bool,
    ) -> Result<(), ValidityError> {
        let complement = arg.complement ^ negate;
        if complement {
            self.graph.set_coherent(false);
        }
        match &arg.event {
            ArgEvent::Constant(value) => {
                self.add_constant_arg(parent, complement ^ !value);
                Ok(())
            }
            ArgEvent::Formula(nested) => {
                let child = self.construct_formula(nested)?;
                let index = child.borrow().index();
                let signed = if complement { -index } else { index };
                Gate::add_arg(parent, self.graph, signed, NodeArg::Gate(child));
                Ok(())
            }
            ArgEvent::Ref(id) => self.add_reference_arg(parent, id, complement),
        }
    }

    fn add_reference_arg(
        &mut self,
        parent: &GatePtr,
        id: &str,
        complement: bool,
    ) -> Result<(), ValidityError> {
        if let Some(event) = self.model.basic_event(id) {
            if self.ccf {
                if let Some(ccf_gate) = event.ccf_gate() {
                    let child = self.construct_gate_by_id(ccf_gate)?;
                    let index = child.borrow().index();
                    let signed = if complement { -index } else { index };
                    Gate::add_arg(parent, self.graph, signed, NodeArg::Gate(child));
                    return Ok(());
                }
            }
            let var = self
                .variables
                .get(id)
                .expect("Uninitialized variable.")
                .clone();
            let index = var.index();
            let signed = if complement { -index } else { index };
            Gate::add_arg(parent, self.graph, signed, NodeArg::Variable(var));
            return Ok(());
        }
        if self.model.gate(id).is_some() {
            let child = self.construct_gate_by_id(id)?;
            let index = child.borrow().index();
            let signed = if complement { -index } else { index };
            Gate::add_arg(parent, self.graph, signed, NodeArg::Gate(child));
            return Ok(());
        }
        if let Some(state) = self.model.house_event(id) {
            self.add_constant_arg(parent, complement ^ !state);
            return Ok(());
        }
        Err(ValidityError::UnknownReference { id: id.to_string() })
    }

    /// Wraps the graph constant in a unique pass-through gate to keep the
    /// construction invariant of typed gate arguments.
    fn add_constant_arg(&mut self, parent: &GatePtr, complement: bool) {
        let null_gate = Gate::new(Connective::Null, self.graph);
        let constant = self.graph.constant().clone();
        let index = if complement {
            -constant.index()
        } else {
            constant.index()
        };
        Gate::add_arg(&null_gate, self.graph, index, NodeArg::Constant(constant));
        // The absorption turned the pass-through into a constant gate.
        let index = null_gate.borrow().index();
        Gate::add_arg(parent, self.graph, index, NodeArg::Gate(null_gate));
    }

    fn construct_gate_by_id(&mut self, id: &str) -> Result<GatePtr, ValidityError> {
        match self.gates.get(id) {
            Some(GateState::Done(gate)) => return Ok(gate.clone()),
            Some(GateState::UnderConstruction) => {
                return Err(ValidityError::CyclicReference { id: id.to_string() })
            }
            None => {}
        }
        let formula = self
            .model
            .gate(id)
            .ok_or_else(|| ValidityError::UnknownReference { id: id.to_string() })?
            .clone();
        self.gates
            .insert(id.to_string(), GateState::UnderConstruction);
        let gate = self.construct_formula(&formula)?;
        self.gates
            .insert(id.to_string(), GateState::Done(gate.clone()));
        Ok(gate)
    }
}
