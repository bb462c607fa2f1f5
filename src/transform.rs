//! Netlist transformation passes.
//!
//! Each pass parses the netlist into statements, decides a `Disposition` for
//! every statement, and renders the result once. Statements are masked with
//! the comment sentinel rather than deleted, so the original text can always
//! be recovered from the output.

use crate::backend::Backend;
use crate::error::{LdoSimError, Result};
use crate::ir::{
    disable_line, DirectiveKind, Disposition, Statement, StatementKind, CONTINUATION_SENTINEL,
    GROUND_NODE, REFERENCE_NODE, REGULATED_NODE, SUPPLY_NODE,
};
use crate::matcher::{FragmentList, MatchMode};
use crate::parser;

/// Cell that generates the trimmed reference in the synthesized design.
pub const TRIM_REFERENCE_CELL: &str = "vref_gen_nmos_with_trim";

/// Statements kept when isolating the power array.
pub const POWER_ARRAY_KEEP: [&str; 3] = ["Xpt_array_unit", "INCLUDE", "ENDS"];

/// Subcircuit name of the isolated power array.
pub const POWER_ARRAY_SUBCKT: &str = "ldoInst";

/// Digital control word driving the power array gates.
pub const CONTROL_WORD_PIN: &str = "ctrl1.ctrl_word";

/// Node fragment of the reference test capacitor in extracted netlists.
pub const TEST_CAPACITOR_NODE: &str = "capacitor_test_nf_";

/// Reference generator instance in extracted netlists.
pub const EXTRACTED_REFERENCE_CELL: &str = "vref_gen_nmos_with_trim_0";

/// Extracted name of the regulated output node.
pub const EXTRACTED_OUTPUT_NODE: &str = "r_VREG";

// ---------------------------------------------------------------------------
// Pass A: reference trim
// ---------------------------------------------------------------------------

/// Disable the reference generator and expose `VREF` on the top-level
/// header so the reference can be driven from the testbench.
///
/// `VREF` goes directly after the first `VDD VSS` pair, in the first
/// `.subckt` header that has one. Only that first pair is considered; a
/// header that already carries `VREF` there is left as is. The header keeps
/// its original spacing.
pub fn trim_reference(input: &str) -> Result<String> {
    let _span = tracing::info_span!("trim_reference").entered();
    let netlist = parser::parse(input);
    let (header_idx, header, roles) = parser::find_supply_header(&netlist)?;
    let disable = FragmentList::new(&[TRIM_REFERENCE_CELL])?;

    let ground_index = roles.supply_index + 1;
    let already_patched = header.pins().nth(ground_index + 1) == Some(REFERENCE_NODE);
    let header_disposition = match header.locate(ground_index) {
        Some(_) if already_patched => {
            tracing::debug!(header = %header.name, "reference already exposed");
            Disposition::Kept
        }
        Some((line_idx, pos)) => {
            let mut lines = netlist.statements[header_idx].lines.clone();
            // keyword and name precede the pins on the directive line
            let (token, continuation) = if line_idx == 0 { (pos + 2, false) } else { (pos, true) };
            lines[line_idx] = insert_after_token(&lines[line_idx], continuation, token, REFERENCE_NODE);
            Disposition::Rewritten(lines)
        }
        None => {
            return Err(LdoSimError::MalformedNetlist(format!(
                "supply pair of '{}' is outside its header",
                header.name
            )))
        }
    };

    let mut disabled = 0usize;
    let dispositions: Vec<Disposition> = netlist
        .statements
        .iter()
        .enumerate()
        .map(|(idx, stmt)| {
            if idx == header_idx {
                return header_disposition.clone();
            }
            if stmt.kind == StatementKind::Instance
                && disable.matches(&stmt.tokens(), MatchMode::Disable)
            {
                disabled += 1;
                tracing::debug!(element = stmt.element_name().unwrap_or(""), "disabled");
                return Disposition::Disabled;
            }
            Disposition::Kept
        })
        .collect();

    tracing::info!(disabled, "reference trim pass complete");
    Ok(netlist.render(&dispositions))
}

// ---------------------------------------------------------------------------
// Pass B: power array isolation
// ---------------------------------------------------------------------------

/// Reduce the design to its power array.
///
/// The first `.subckt` header is replaced by `.SUBCKT ldoInst VREG VDD VSS`
/// (its continuation lines are masked) and every other subcircuit is
/// disabled whole. Every remaining non-blank statement that does not match
/// `POWER_ARRAY_KEEP` is disabled, and any surviving pin on the
/// control word is tied to `VSS` so the array can be driven as a plain
/// resistor network.
pub fn isolate_power_array(input: &str) -> Result<String> {
    let _span = tracing::info_span!("isolate_power_array").entered();
    let netlist = parser::parse(input);
    let header_idx = netlist
        .position(StatementKind::Directive(DirectiveKind::Subckt))
        .ok_or_else(|| LdoSimError::MalformedNetlist("no .subckt header".to_string()))?;
    let keep = FragmentList::new(&POWER_ARRAY_KEEP)?;

    let subckt = StatementKind::Directive(DirectiveKind::Subckt);
    let ends = StatementKind::Directive(DirectiveKind::Ends);
    let mut kept = 0usize;
    let mut rewired = 0usize;
    let mut in_other_subckt = false;
    let mut dispositions = Vec::with_capacity(netlist.statements.len());
    for (idx, stmt) in netlist.statements.iter().enumerate() {
        let disposition = if idx == header_idx {
            Disposition::Rewritten(power_array_header(stmt))
        } else if stmt.is_blank() {
            Disposition::Kept
        } else if in_other_subckt || stmt.kind == subckt {
            // any other subcircuit goes as a whole, `.ENDS` included
            in_other_subckt = stmt.kind != ends;
            Disposition::Disabled
        } else if keep.matches(&stmt.tokens(), MatchMode::Keep) {
            Disposition::Disabled
        } else if stmt.tokens().iter().any(|t| t.contains(CONTROL_WORD_PIN)) {
            kept += 1;
            rewired += 1;
            Disposition::Rewritten(tie_control_word(stmt))
        } else {
            kept += 1;
            Disposition::Kept
        };
        dispositions.push(disposition);
    }

    tracing::info!(kept, rewired, "power array isolation complete");
    Ok(netlist.render(&dispositions))
}

fn power_array_header(stmt: &Statement) -> Vec<String> {
    let mut lines = vec![format!(
        ".SUBCKT {} {} {} {}",
        POWER_ARRAY_SUBCKT, REGULATED_NODE, SUPPLY_NODE, GROUND_NODE
    )];
    lines.extend(stmt.lines.iter().skip(1).map(|l| disable_line(l)));
    lines
}

fn tie_control_word(stmt: &Statement) -> Vec<String> {
    stmt.lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let (prefix, body) = match line.strip_prefix(CONTINUATION_SENTINEL) {
                Some(body) if i > 0 => (CONTINUATION_SENTINEL.to_string(), body),
                _ => (String::new(), line.as_str()),
            };
            let body = map_tokens(body, |token| {
                if token.contains(CONTROL_WORD_PIN) {
                    GROUND_NODE.to_string()
                } else {
                    token.to_string()
                }
            });
            prefix + &body
        })
        .collect()
}

/// Apply `f` to every whitespace-delimited token, keeping the separators.
fn map_tokens(line: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(line.len());
    let mut token_start: Option<usize> = None;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = token_start.take() {
                out.push_str(&f(&line[start..i]));
            }
            out.push(c);
        } else if token_start.is_none() {
            token_start = Some(i);
        }
    }
    if let Some(start) = token_start {
        out.push_str(&f(&line[start..]));
    }
    out
}

// ---------------------------------------------------------------------------
// Pass C: parasitic-extracted netlist
// ---------------------------------------------------------------------------

/// Output of the extracted-netlist pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedNetlist {
    pub netlist: String,
    /// Interconnect list for deck templates, with canonical `VREF`/`VREG`.
    pub pin_ordering: String,
    /// Extracted name of the test-capacitor node now on the header.
    pub reference_node: String,
}

/// Prepare a post-layout netlist of `design` for `backend`.
///
/// The test-capacitor node is exposed on the design header as an extra
/// continuation line. Parasitic R/C elements touching the reference
/// generator and the generator instance itself (with all its continuation
/// lines) are disabled.
pub fn prepare_extracted(input: &str, design: &str, backend: Backend) -> Result<ExtractedNetlist> {
    let _span = tracing::info_span!("prepare_extracted", design).entered();
    let netlist = parser::parse(input);
    let reference_node = parser::find_node(&netlist, TEST_CAPACITOR_NODE).ok_or_else(|| {
        LdoSimError::MalformedNetlist(format!(
            "no node containing '{}' in extracted netlist",
            TEST_CAPACITOR_NODE
        ))
    })?;
    let (header_idx, mut header) = parser::find_subckt(&netlist, Some(design))?;
    let parasitics = FragmentList::new(&[EXTRACTED_REFERENCE_CELL])?;

    let mut disabled = 0usize;
    let dispositions: Vec<Disposition> = netlist
        .statements
        .iter()
        .enumerate()
        .map(|(idx, stmt)| {
            if idx == header_idx {
                let mut lines = stmt.lines.clone();
                lines.push(format!("{} {}", CONTINUATION_SENTINEL, reference_node));
                return Disposition::Rewritten(lines);
            }
            if is_reference_parasitic(stmt, &parasitics) || is_reference_instance(stmt) {
                disabled += 1;
                return Disposition::Disabled;
            }
            Disposition::Kept
        })
        .collect();

    let text = backend.descriptor().escape_comments(&netlist.render(&dispositions));

    header.push_continuation(vec![reference_node.clone()]);
    let mut output_renamed = false;
    header.rename_pins(|pin| {
        if pin == reference_node {
            Some(REFERENCE_NODE.to_string())
        } else if pin == EXTRACTED_OUTPUT_NODE && !output_renamed {
            output_renamed = true;
            Some(REGULATED_NODE.to_string())
        } else {
            None
        }
    });

    tracing::info!(disabled, reference_node = %reference_node, "extracted netlist prepared");
    Ok(ExtractedNetlist {
        netlist: text,
        pin_ordering: header.pin_ordering(),
        reference_node,
    })
}

/// Insert ` word` right after the token at `index`, leaving every other
/// byte of the line as written. The `+` of a continuation line is not
/// counted as a token.
fn insert_after_token(line: &str, continuation: bool, index: usize, word: &str) -> String {
    let (prefix, body) = match line.strip_prefix(CONTINUATION_SENTINEL) {
        Some(body) if continuation => (&line[..CONTINUATION_SENTINEL.len_utf8()], body),
        _ => ("", line),
    };
    let mut started = 0usize;
    let mut prev_space = true;
    let mut end = body.len();
    for (i, c) in body.char_indices() {
        let space = c.is_whitespace();
        if !space && prev_space {
            started += 1;
        }
        if space && !prev_space && started == index + 1 {
            end = i;
            break;
        }
        prev_space = space;
    }
    format!("{}{} {}{}", prefix, &body[..end], word, &body[end..])
}

fn is_reference_parasitic(stmt: &Statement, parasitics: &FragmentList) -> bool {
    let is_rc = stmt
        .element_name()
        .and_then(|n| n.chars().next())
        .is_some_and(|c| matches!(c.to_ascii_uppercase(), 'R' | 'C'));
    is_rc && parasitics.matches(&stmt.tokens(), MatchMode::Disable)
}

fn is_reference_instance(stmt: &Statement) -> bool {
    stmt.element_name().is_some_and(|name| {
        name.starts_with(['X', 'x']) && name.contains(EXTRACTED_REFERENCE_CELL)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::restore_line;

    const SYNTH: &str = "\
.INCLUDE /pdk/sky130_fd_sc_hd.spice
.SUBCKT ldoInst clk ctrl_out[0] reset trim1 VDD VSS VREG
Xcmp clk cmp_out VDD VSS sky130_fd_sc_hd__dfxtp_1
Xvref_gen vref_gen_nmos_with_trim_0 trim1 VDD VSS vref_gen_nmos_with_trim
Xpt_array_unit_0 ctrl1.ctrl_word[0] VDD VREG VSS PT_UNIT_CELL
Xpt_array_unit_1 ctrl1.ctrl_word[1] VDD  VREG VSS PT_UNIT_CELL
Xctrl clk ctrl1.ctrl_word[0] ctrl1.ctrl_word[1] VDD VSS ldo_ctrl
.ENDS
";

    // ---- Pass A ----

    #[test]
    fn test_trim_reference_disables_generator_and_patches_header() {
        let out = trim_reference(SYNTH).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[1],
            ".SUBCKT ldoInst clk ctrl_out[0] reset trim1 VDD VSS VREF VREG"
        );
        assert!(lines[3].starts_with("*Xvref_gen"));
        assert_eq!(lines[2], "Xcmp clk cmp_out VDD VSS sky130_fd_sc_hd__dfxtp_1");
        assert_eq!(out.matches('*').count(), 1);
    }

    #[test]
    fn test_trim_reference_first_supply_pair_only() {
        let input = ".subckt top a VDD VSS b\n+ VDD VSS\n.ends";
        let out = trim_reference(input).unwrap();
        assert_eq!(out, ".subckt top a VDD VSS VREF b\n+ VDD VSS\n.ends");
    }

    #[test]
    fn test_trim_reference_reapplied_is_stable() {
        let once = trim_reference(SYNTH).unwrap();
        let twice = trim_reference(&once).unwrap();
        let header = twice.lines().nth(1).unwrap();
        assert_eq!(header.matches("VREF").count(), 1);
        assert_eq!(once.lines().nth(1), twice.lines().nth(1));
    }

    #[test]
    fn test_trim_reference_requires_header() {
        let err = trim_reference("Xa b c d\n").unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
        let err = trim_reference(".subckt top a b\n.ends").unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
    }

    #[test]
    fn test_disabled_lines_restore_original() {
        let out = trim_reference(SYNTH).unwrap();
        let masked = out.lines().find(|l| l.starts_with('*')).unwrap();
        assert_eq!(
            restore_line(masked),
            SYNTH.lines().find(|l| l.starts_with("Xvref_gen"))
        );
    }

    #[test]
    fn test_trim_reference_skips_leading_library_cell() {
        let input = "\
.SUBCKT cell A Y VPWR VGND
R1 A Y 1
.ENDS
.SUBCKT ldoInst clk VDD VSS VREG
Xvref_gen VDD VSS vref_gen_nmos_with_trim
.ENDS";
        let out = trim_reference(input).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], ".SUBCKT cell A Y VPWR VGND");
        assert_eq!(lines[3], ".SUBCKT ldoInst clk VDD VSS VREF VREG");
        assert!(lines[4].starts_with("*Xvref_gen"));
    }

    #[test]
    fn test_trim_reference_without_any_supply_pair() {
        let input = ".SUBCKT cell A Y VPWR VGND\n.ENDS\n.SUBCKT top a VSS VDD\n.ENDS";
        let err = trim_reference(input).unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
    }

    #[test]
    fn test_trim_reference_keeps_header_spacing() {
        let input = "  .SUBCKT ldoInst\tclk  VDD VSS\tVREG\n+  trim1\t trim2\n.ENDS";
        let out = trim_reference(input).unwrap();
        assert_eq!(
            out,
            "  .SUBCKT ldoInst\tclk  VDD VSS VREF\tVREG\n+  trim1\t trim2\n.ENDS"
        );

        let input = ".subckt top clk\n+\tVDD   VSS  VREG\n.ends";
        let out = trim_reference(input).unwrap();
        assert_eq!(out, ".subckt top clk\n+\tVDD   VSS VREF  VREG\n.ends");
    }

    #[test]
    fn test_insert_after_token() {
        assert_eq!(insert_after_token("a  b\tc", false, 1, "X"), "a  b X\tc");
        assert_eq!(insert_after_token("a b", false, 1, "X"), "a b X");
        assert_eq!(insert_after_token("+ a b", true, 0, "X"), "+ a X b");
        assert_eq!(insert_after_token("+a b", true, 0, "X"), "+a X b");
    }

    // ---- Pass B ----

    #[test]
    fn test_isolate_power_array() {
        let out = isolate_power_array(SYNTH).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], ".INCLUDE /pdk/sky130_fd_sc_hd.spice");
        assert_eq!(lines[1], ".SUBCKT ldoInst VREG VDD VSS");
        assert!(lines[2].starts_with("*Xcmp"));
        assert!(lines[3].starts_with("*Xvref_gen"));
        assert_eq!(lines[4], "Xpt_array_unit_0 VSS VDD VREG VSS PT_UNIT_CELL");
        assert_eq!(lines[5], "Xpt_array_unit_1 VSS VDD  VREG VSS PT_UNIT_CELL");
        assert!(lines[6].starts_with("*Xctrl clk ctrl1.ctrl_word[0]"));
        assert_eq!(lines[7], ".ENDS");
    }

    #[test]
    fn test_isolate_power_array_counts() {
        let out = isolate_power_array(SYNTH).unwrap();
        // header rewritten; .INCLUDE, two array units and .ENDS survive
        let live: Vec<&str> = out
            .lines()
            .filter(|l| !l.is_empty() && !l.starts_with('*'))
            .collect();
        assert_eq!(live.len(), 5);
        let masked = out.lines().filter(|l| l.starts_with('*')).count();
        assert_eq!(masked, 3);
    }

    #[test]
    fn test_isolate_power_array_masks_header_continuations() {
        let input = ".SUBCKT top a b\n+ c d\nXpt_array_unit_0 a b PT\n.ENDS";
        let out = isolate_power_array(input).unwrap();
        assert_eq!(
            out,
            ".SUBCKT ldoInst VREG VDD VSS\n*+ c d\nXpt_array_unit_0 a b PT\n.ENDS"
        );
    }

    #[test]
    fn test_isolate_power_array_disables_other_subckts() {
        let input = "\
.SUBCKT ldoInst a VDD VSS
Xpt_array_unit_0 ctrl1.ctrl_word[0] VDD VREG VSS PT
.ENDS

.SUBCKT helper x y
R1 x y 1
Xpt_array_unit_9 x y PT
.ENDS
.INCLUDE cells.spice";
        let out = isolate_power_array(input).unwrap();
        assert_eq!(
            out,
            "\
.SUBCKT ldoInst VREG VDD VSS
Xpt_array_unit_0 VSS VDD VREG VSS PT
.ENDS

*.SUBCKT helper x y
*R1 x y 1
*Xpt_array_unit_9 x y PT
*.ENDS
.INCLUDE cells.spice"
        );
        let live = |kw: &str| out.lines().filter(|l| l.starts_with(kw)).count();
        assert_eq!(live(".SUBCKT"), 1);
        assert_eq!(live(".ENDS"), 1);
    }

    #[test]
    fn test_isolate_power_array_requires_header() {
        let err = isolate_power_array("Xpt_array_unit_0 a b PT\n").unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
    }

    #[test]
    fn test_map_tokens_keeps_separators() {
        assert_eq!(map_tokens("a  b\tc ", |t| t.to_uppercase()), "A  B\tC ");
        assert_eq!(map_tokens("", |t| t.to_string()), "");
    }

    // ---- Pass C ----

    const EXTRACTED: &str = "\
* NGSPICE file created from ldo_top.ext
.subckt ldo_top VDD VSS clk
+ r_VREG reset
Xvref_gen_nmos_with_trim_0 capacitor_test_nf_0/a VDD VSS
+ trim1 trim2
+ vref_gen_nmos_with_trim
C0 vref_gen_nmos_with_trim_0/n1 VSS 0.12f $ **FLOATING
R0 vref_gen_nmos_with_trim_0/n2 capacitor_test_nf_0/a 12.5
C1 r_VREG VSS 1.1f
X1 clk VDD VSS sky130_fd_sc_hd__inv_1
.ends
";

    #[test]
    fn test_prepare_extracted_ngspice() {
        let out = prepare_extracted(EXTRACTED, "ldo_top", Backend::Ngspice).unwrap();
        assert_eq!(out.reference_node, "capacitor_test_nf_0/a");
        let lines: Vec<&str> = out.netlist.lines().collect();
        assert_eq!(lines[1], ".subckt ldo_top VDD VSS clk");
        assert_eq!(lines[2], "+ r_VREG reset");
        assert_eq!(lines[3], "+ capacitor_test_nf_0/a");
        assert!(lines[4].starts_with("*Xvref_gen_nmos_with_trim_0"));
        assert_eq!(lines[5], "*+ trim1 trim2");
        assert_eq!(lines[6], "*+ vref_gen_nmos_with_trim");
        assert_eq!(lines[7], "*C0 vref_gen_nmos_with_trim_0/n1 VSS 0.12f $ **FLOATING");
        assert!(lines[8].starts_with("*R0"));
        assert_eq!(lines[9], "C1 r_VREG VSS 1.1f");
        assert_eq!(lines[10], "X1 clk VDD VSS sky130_fd_sc_hd__inv_1");
        assert_eq!(out.pin_ordering, "VDD VSS clk\n+ VREG reset\n+ VREF");
    }

    #[test]
    fn test_prepare_extracted_xyce_escapes_comments() {
        let out = prepare_extracted(EXTRACTED, "LDO_TOP", Backend::Xyce).unwrap();
        assert!(!out.netlist.contains('$'));
        assert!(out.netlist.contains("0.12f ; **FLOATING"));
    }

    #[test]
    fn test_prepare_extracted_missing_test_capacitor() {
        let input = EXTRACTED.replace("capacitor_test_nf_0", "cap0");
        let err = prepare_extracted(&input, "ldo_top", Backend::Ngspice).unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
    }

    #[test]
    fn test_prepare_extracted_missing_design() {
        let err = prepare_extracted(EXTRACTED, "other", Backend::Ngspice).unwrap_err();
        assert!(matches!(err, LdoSimError::MalformedNetlist(_)));
    }
}
