//! Debug printing of PDAGs in a flat formula notation
//!
//! Gates print as `G<index> := (args...)` with `~` for complement edges,
//! one line per gate, children before parents. Helpful when inspecting
//! preprocessing passes; not a stable serialization format.

use std::fmt;

use rustc_hash::FxHashSet;

use super::{Connective, GatePtr, Pdag};

impl fmt::Display for Pdag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printed = FxHashSet::default();
        if self.complement() {
            writeln!(f, "complement graph")?;
        }
        write_gate(f, &self.root(), &mut printed)
    }
}

fn write_gate(
    f: &mut fmt::Formatter<'_>,
    gate: &GatePtr,
    printed: &mut FxHashSet<i32>,
) -> fmt::Result {
    let g = gate.borrow();
    if !printed.insert(g.index()) {
        return Ok(());
    }
    for (_, child) in g.gate_args() {
        write_gate(f, child, printed)?;
    }
    let (begin, op, end) = formula_signature(&g);
    let mut formula = String::new();
    let mut remaining = g.args().len();
    let mut print_arg = |formula: &mut String, signed: i32, name: String| {
        if signed < 0 {
            formula.push('~');
        }
        formula.push_str(&name);
        remaining -= 1;
        if remaining > 0 {
            formula.push_str(op);
        }
    };
    for (signed, child) in g.gate_args() {
        print_arg(&mut formula, *signed, gate_name(&child.borrow()));
    }
    for (signed, var) in g.variable_args() {
        print_arg(&mut formula, *signed, format!("B{}", var.index()));
    }
    if g.constant() {
        let signed = *g.args().iter().next().expect("Constant gate without args");
        print_arg(&mut formula, signed, format!("H{}", signed.abs()));
    }
    writeln!(f, "{} := {}{}{}", gate_name(&g), begin, formula, end)
}

fn gate_name(gate: &super::Gate) -> String {
    let tag = if gate.constant() {
        "GC"
    } else if gate.module() {
        "GM"
    } else {
        "G"
    };
    format!("{}{}", tag, gate.index())
}

fn formula_signature(gate: &super::Gate) -> (String, &'static str, &'static str) {
    match gate.connective() {
        Connective::And => ("(".to_string(), " & ", ")"),
        Connective::Nand => ("~(".to_string(), " & ", ")"),
        Connective::Or => ("(".to_string(), " | ", ")"),
        Connective::Nor => ("~(".to_string(), " | ", ")"),
        Connective::Xor => ("(".to_string(), " ^ ", ")"),
        Connective::Not => ("~(".to_string(), "", ")"),
        Connective::Null => ("".to_string(), "", ""),
        Connective::Atleast => (format!("@({}, [", gate.min_number()), ", ", "])"),
    }
}
