//! Netlist intermediate representation.
//!
//! The parser produces a `Netlist`: an ordered list of `Statement`s, each a
//! leading line plus any `+` continuation lines. Transformation passes never
//! edit text in place. They tag every statement with a `Disposition` and the
//! netlist is rendered once from those tags.

/// Prefix that masks a line from the simulator.
pub const COMMENT_SENTINEL: char = '*';

/// Prefix of a line that continues the previous statement.
pub const CONTINUATION_SENTINEL: char = '+';

// Top-level rail names emitted by the design generator.
pub const SUPPLY_NODE: &str = "VDD";
pub const GROUND_NODE: &str = "VSS";
pub const REFERENCE_NODE: &str = "VREF";
pub const REGULATED_NODE: &str = "VREG";

/// Dot-directive flavours the transformation passes care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Subckt,
    Ends,
    Include,
    Lib,
    Other,
}

/// Classification of a statement by its leading line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Blank,
    Comment,
    Directive(DirectiveKind),
    /// Circuit element: name token followed by pins and parameters.
    Instance,
    /// Continuation lines with nothing to continue.
    Orphan,
}

/// One netlist statement with its original text.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Leading line followed by its continuation lines, verbatim.
    pub lines: Vec<String>,
}

impl Statement {
    /// Whitespace tokens across all lines, continuation markers removed.
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            let body = if i > 0 {
                line.strip_prefix(CONTINUATION_SENTINEL).unwrap_or(line)
            } else {
                line.as_str()
            };
            tokens.extend(body.split_whitespace());
        }
        tokens
    }

    /// Element name of an instance line (`Xfoo`, `R12`, ...).
    pub fn element_name(&self) -> Option<&str> {
        match self.kind {
            StatementKind::Instance => self.lines.first()?.split_whitespace().next(),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.kind == StatementKind::Blank
    }
}

/// What a pass decided to do with a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Kept,
    /// Every line of the statement is masked with the comment sentinel.
    Disabled,
    /// The statement is replaced by these lines.
    Rewritten(Vec<String>),
}

/// A parsed netlist. Rendering with all statements `Kept` reproduces the
/// input byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Netlist {
    pub statements: Vec<Statement>,
}

impl Netlist {
    /// Render the netlist with one disposition per statement.
    ///
    /// Panics if `dispositions` is not the same length as `statements`.
    pub fn render(&self, dispositions: &[Disposition]) -> String {
        assert_eq!(
            self.statements.len(),
            dispositions.len(),
            "one disposition per statement"
        );
        let mut out: Vec<String> = Vec::new();
        for (stmt, disposition) in self.statements.iter().zip(dispositions) {
            match disposition {
                Disposition::Kept => out.extend(stmt.lines.iter().cloned()),
                Disposition::Disabled => out.extend(stmt.lines.iter().map(|l| disable_line(l))),
                Disposition::Rewritten(lines) => out.extend(lines.iter().cloned()),
            }
        }
        out.join("\n")
    }

    /// Index of the first statement of the given kind.
    pub fn position(&self, kind: StatementKind) -> Option<usize> {
        self.statements.iter().position(|s| s.kind == kind)
    }
}

/// Mask a line so the simulator ignores it.
pub fn disable_line(line: &str) -> String {
    format!("{}{}", COMMENT_SENTINEL, line)
}

/// Undo `disable_line`. Returns `None` if the line was not masked.
pub fn restore_line(line: &str) -> Option<&str> {
    line.strip_prefix(COMMENT_SENTINEL)
}

/// A `.subckt` declaration with its external interconnect list.
///
/// Pins are kept grouped by the physical line they were written on so a
/// rewritten header keeps the generator's line layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SubcktHeader {
    /// Keyword as written (`.subckt`, `.SUBCKT`).
    pub keyword: String,
    pub name: String,
    /// `lines[0]` holds the pins on the directive line, the rest one entry
    /// per continuation line.
    pub lines: Vec<Vec<String>>,
}

impl SubcktHeader {
    pub fn pins(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().flatten().map(String::as_str)
    }

    /// Physical line and position within that line of the pin at flat
    /// position `index`.
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut remaining = index;
        for (line_idx, line) in self.lines.iter().enumerate() {
            if remaining < line.len() {
                return Some((line_idx, remaining));
            }
            remaining -= line.len();
        }
        None
    }

    /// Append a continuation line holding `pins`.
    pub fn push_continuation(&mut self, pins: Vec<String>) {
        self.lines.push(pins);
    }

    /// Replace every pin for which `rename` returns a new name.
    pub fn rename_pins(&mut self, mut rename: impl FnMut(&str) -> Option<String>) {
        for pin in self.lines.iter_mut().flatten() {
            if let Some(new) = rename(pin) {
                *pin = new;
            }
        }
    }

    /// Interconnect list without keyword and name, in the multi-line form
    /// deck templates expect for an instance line.
    pub fn pin_ordering(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        if let Some(first) = self.lines.first() {
            if !first.is_empty() {
                out.push(first.join(" "));
            }
        }
        for line in self.lines.iter().skip(1) {
            if out.is_empty() {
                out.push(line.join(" "));
            } else {
                out.push(continuation_line(line));
            }
        }
        out.join("\n")
    }
}

fn continuation_line(pins: &[String]) -> String {
    let mut line = String::from(CONTINUATION_SENTINEL);
    for pin in pins {
        line.push(' ');
        line.push_str(pin);
    }
    line
}

/// Positional roles of the top-level interconnect list.
///
/// The upstream generator always ends the list with the supply pair, then
/// (once transformed) the reference and regulated output. `parse_roles` in
/// the parser turns that convention into this record.
#[derive(Debug, Clone, PartialEq)]
pub struct InterconnectRoles {
    /// Flat pin index of the supply node.
    pub supply_index: usize,
    pub supply: String,
    pub ground: String,
    pub reference: Option<String>,
    pub regulated_output: Option<String>,
    /// Every pin before the supply pair, in order.
    pub extra_interconnect: Vec<String>,
}
