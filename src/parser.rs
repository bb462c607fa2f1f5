//! Structural netlist reader.
//!
//! Splits a netlist into statements without interpreting element values.
//!
//! # Recognised lines
//!
//! ```text
//! (blank)
//! * comment
//! + continuation of the previous statement
//! .SUBCKT name pin pin ...      (case-insensitive keyword)
//! .ENDS [name]
//! .INCLUDE path / .INC path
//! .LIB path corner
//! .anything-else                (other directive)
//! Xname pin pin ... cell        (any other line is an instance)
//! ```
//!
//! Lines are split on `'\n'` only, so a `Netlist` rendered unchanged is the
//! input byte for byte.

use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{space0, space1};
use nom::combinator::recognize;
use nom::sequence::preceded;
use nom::IResult;
use nom::Parser;

use crate::error::{LdoSimError, Result};
use crate::ir::{
    DirectiveKind, InterconnectRoles, Netlist, Statement, StatementKind, SubcktHeader,
    CONTINUATION_SENTINEL, GROUND_NODE, REFERENCE_NODE, REGULATED_NODE, SUPPLY_NODE,
};

/// Parse netlist text into statements.
pub fn parse(input: &str) -> Netlist {
    let mut statements: Vec<Statement> = Vec::new();

    for line in input.split('\n') {
        if line.starts_with(CONTINUATION_SENTINEL) {
            match statements.last_mut() {
                Some(prev) if !prev.is_blank() => {
                    prev.lines.push(line.to_string());
                    continue;
                }
                _ => {
                    statements.push(Statement {
                        kind: StatementKind::Orphan,
                        lines: vec![line.to_string()],
                    });
                    continue;
                }
            }
        }
        statements.push(Statement {
            kind: classify(line),
            lines: vec![line.to_string()],
        });
    }

    Netlist { statements }
}

/// Classify a single leading line.
pub fn classify(line: &str) -> StatementKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return StatementKind::Blank;
    }
    if trimmed.starts_with('*') {
        return StatementKind::Comment;
    }
    if let Ok((_, keyword)) = directive_keyword(trimmed) {
        let kind = match keyword.to_ascii_uppercase().as_str() {
            ".SUBCKT" => DirectiveKind::Subckt,
            ".ENDS" => DirectiveKind::Ends,
            ".INCLUDE" | ".INC" => DirectiveKind::Include,
            ".LIB" => DirectiveKind::Lib,
            _ => DirectiveKind::Other,
        };
        return StatementKind::Directive(kind);
    }
    StatementKind::Instance
}

// ---------------------------------------------------------------------------
// Token parsers
// ---------------------------------------------------------------------------

/// A dot keyword such as `.subckt` or `.ENDS`.
fn directive_keyword(input: &str) -> IResult<&str, &str> {
    recognize(preceded(
        tag("."),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// Everything up to the next whitespace.
fn name_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// `.subckt <name>` prefix of a header line; returns (keyword, name, rest).
fn subckt_prefix(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, (_, keyword, _, name)) =
        (space0, tag_no_case(".subckt"), space1, name_token).parse(input)?;
    Ok((rest, (keyword, name)))
}

// ---------------------------------------------------------------------------
// Subcircuit headers
// ---------------------------------------------------------------------------

/// Parse a `.subckt` statement into a header record.
pub fn parse_subckt_header(stmt: &Statement) -> Result<SubcktHeader> {
    let first = stmt
        .lines
        .first()
        .ok_or_else(|| LdoSimError::MalformedNetlist("empty subcircuit statement".to_string()))?;
    let (rest, (keyword, name)) = subckt_prefix(first).map_err(|_| {
        LdoSimError::MalformedNetlist(format!("not a subcircuit header: {}", first))
    })?;

    let mut lines = vec![rest.split_whitespace().map(str::to_string).collect::<Vec<_>>()];
    for cont in stmt.lines.iter().skip(1) {
        let body = cont.strip_prefix(CONTINUATION_SENTINEL).unwrap_or(cont);
        lines.push(body.split_whitespace().map(str::to_string).collect());
    }

    Ok(SubcktHeader {
        keyword: keyword.to_string(),
        name: name.to_string(),
        lines,
    })
}

/// Find the first `.subckt` statement, optionally restricted to a design
/// name (compared case-insensitively). Returns its statement index.
pub fn find_subckt(netlist: &Netlist, design: Option<&str>) -> Result<(usize, SubcktHeader)> {
    for (idx, stmt) in netlist.statements.iter().enumerate() {
        if stmt.kind != StatementKind::Directive(DirectiveKind::Subckt) {
            continue;
        }
        let header = parse_subckt_header(stmt)?;
        match design {
            Some(d) if !header.name.eq_ignore_ascii_case(d) => continue,
            _ => return Ok((idx, header)),
        }
    }
    Err(LdoSimError::MalformedNetlist(match design {
        Some(d) => format!("no .subckt header for design '{}'", d),
        None => "no .subckt header".to_string(),
    }))
}

/// First `.subckt` header carrying the `VDD VSS` supply pair, with its
/// resolved roles. Headers without the pair, such as library cells listed
/// ahead of the top level, are skipped.
pub fn find_supply_header(netlist: &Netlist) -> Result<(usize, SubcktHeader, InterconnectRoles)> {
    let mut headers = 0usize;
    for (idx, stmt) in netlist.statements.iter().enumerate() {
        if stmt.kind != StatementKind::Directive(DirectiveKind::Subckt) {
            continue;
        }
        headers += 1;
        let header = parse_subckt_header(stmt)?;
        if let Ok(roles) = parse_roles(&header) {
            return Ok((idx, header, roles));
        }
    }
    Err(LdoSimError::MalformedNetlist(if headers == 0 {
        "no .subckt header".to_string()
    } else {
        format!(
            "none of {} .subckt headers has a '{} {}' supply pair",
            headers, SUPPLY_NODE, GROUND_NODE
        )
    }))
}

/// Resolve the positional rail convention of a top-level header.
///
/// The supply pair is the first adjacent `VDD VSS` in the interconnect
/// list. Anything before it is extra interconnect; `VREF` and `VREG` after
/// it fill the reference and regulated-output roles.
pub fn parse_roles(header: &SubcktHeader) -> Result<InterconnectRoles> {
    let pins: Vec<&str> = header.pins().collect();
    let supply_index = pins
        .windows(2)
        .position(|w| w[0] == SUPPLY_NODE && w[1] == GROUND_NODE)
        .ok_or_else(|| {
            LdoSimError::MalformedNetlist(format!(
                "header of '{}' has no '{} {}' supply pair",
                header.name, SUPPLY_NODE, GROUND_NODE
            ))
        })?;

    let mut reference = None;
    let mut regulated_output = None;
    for pin in &pins[supply_index + 2..] {
        if *pin == REFERENCE_NODE && reference.is_none() {
            reference = Some(pin.to_string());
        } else if *pin == REGULATED_NODE && regulated_output.is_none() {
            regulated_output = Some(pin.to_string());
        }
    }

    Ok(InterconnectRoles {
        supply_index,
        supply: pins[supply_index].to_string(),
        ground: pins[supply_index + 1].to_string(),
        reference,
        regulated_output,
        extra_interconnect: pins[..supply_index].iter().map(|p| p.to_string()).collect(),
    })
}

// ---------------------------------------------------------------------------
// Node search
// ---------------------------------------------------------------------------

/// First node name that starts with `fragment` at a word boundary, scanning
/// the whole text in order. The name runs to the next whitespace.
pub fn find_node(netlist: &Netlist, fragment: &str) -> Option<String> {
    netlist
        .statements
        .iter()
        .flat_map(|s| s.lines.iter())
        .flat_map(|l| l.split_whitespace())
        .find_map(|token| node_in_token(token, fragment))
}

fn node_in_token(token: &str, fragment: &str) -> Option<String> {
    let mut from = 0;
    while let Some(offset) = token[from..].find(fragment) {
        let pos = from + offset;
        let boundary = token[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if boundary {
            return Some(token[pos..].to_string());
        }
        from = pos + fragment.len();
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
