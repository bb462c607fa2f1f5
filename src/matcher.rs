//! Pin matcher: substring test of name fragments against instance tokens.
//!
//! Synthesized pin and instance names carry part of the standard-cell name
//! they came from, so a fragment anywhere inside a token counts as a hit.

use crate::error::{LdoSimError, Result};

/// How a hit is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Hit means "disable this statement".
    Disable,
    /// Hit means "keep this statement"; everything else is disabled.
    Keep,
}

/// Returns `true` when the statement should be disabled under `mode`.
///
/// A hit is any fragment occurring as a substring of any token. With
/// `MatchMode::Disable` a hit returns `true`; with `MatchMode::Keep` the
/// result is inverted.
///
/// Fails with `InvalidArgument` when `fragments` is empty or contains an
/// empty string, since either would make the result meaningless.
pub fn matches<T, F>(tokens: &[T], fragments: &[F], mode: MatchMode) -> Result<bool>
where
    T: AsRef<str>,
    F: AsRef<str>,
{
    validate_fragments(fragments)?;
    Ok(decide(tokens, fragments, mode))
}

/// Hit test shared by `matches` and `FragmentList`; fragments are assumed
/// valid.
fn decide<T, F>(tokens: &[T], fragments: &[F], mode: MatchMode) -> bool
where
    T: AsRef<str>,
    F: AsRef<str>,
{
    let found = fragments.iter().any(|fragment| {
        let fragment = fragment.as_ref();
        tokens.iter().any(|token| token.as_ref().contains(fragment))
    });
    match mode {
        MatchMode::Disable => found,
        MatchMode::Keep => !found,
    }
}

fn validate_fragments<F: AsRef<str>>(fragments: &[F]) -> Result<()> {
    if fragments.is_empty() {
        return Err(LdoSimError::InvalidArgument(
            "fragment list must contain at least one name".to_string(),
        ));
    }
    if let Some(pos) = fragments.iter().position(|f| f.as_ref().is_empty()) {
        return Err(LdoSimError::InvalidArgument(format!(
            "fragment {} is empty and would match every pin",
            pos
        )));
    }
    Ok(())
}

/// A validated, owned fragment list for passes that reuse it across many
/// statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentList(Vec<String>);

impl FragmentList {
    pub fn new<F: AsRef<str>>(fragments: &[F]) -> Result<Self> {
        validate_fragments(fragments)?;
        Ok(Self(fragments.iter().map(|f| f.as_ref().to_string()).collect()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn matches<T: AsRef<str>>(&self, tokens: &[T], mode: MatchMode) -> bool {
        decide(tokens, &self.0, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: [&str; 5] = ["Xpt_array_unit_3", "ctrl1.ctrl_word[2]", "VDD", "VREG", "pt_cell"];

    #[test]
    fn test_substring_hit() {
        assert!(matches(&LINE, &["pt_array_unit"], MatchMode::Disable).unwrap());
        assert!(matches(&LINE, &["nope", "ctrl_word"], MatchMode::Disable).unwrap());
        assert!(!matches(&LINE, &["nope"], MatchMode::Disable).unwrap());
    }

    #[test]
    fn test_modes_are_complements() {
        let fragment_sets: [&[&str]; 4] = [&["VDD"], &["xx"], &["xx", "VRE"], &["INCLUDE", "ENDS"]];
        for fragments in fragment_sets {
            let disable = matches(&LINE, fragments, MatchMode::Disable).unwrap();
            let keep = matches(&LINE, fragments, MatchMode::Keep).unwrap();
            assert_eq!(disable, !keep, "fragments {:?}", fragments);
        }
    }

    #[test]
    fn test_empty_tokens_never_hit() {
        let tokens: [&str; 0] = [];
        assert!(!matches(&tokens, &["a"], MatchMode::Disable).unwrap());
        assert!(matches(&tokens, &["a"], MatchMode::Keep).unwrap());
    }

    #[test]
    fn test_rejects_empty_fragment_list() {
        let empty: [&str; 0] = [];
        let err = matches(&LINE, &empty, MatchMode::Disable).unwrap_err();
        assert!(matches!(err, LdoSimError::InvalidArgument(_)));
    }

    #[test]
    fn test_rejects_empty_fragment() {
        let err = matches(&LINE, &["VDD", ""], MatchMode::Keep).unwrap_err();
        assert!(matches!(err, LdoSimError::InvalidArgument(_)));
    }

    #[test]
    fn test_fragment_list_validates_like_matches() {
        let single = FragmentList::new(&["vref_gen_nmos_with_trim"]).unwrap();
        assert_eq!(single.as_slice().len(), 1);
        let empty: [&str; 0] = [];
        assert!(matches!(
            FragmentList::new(&empty),
            Err(LdoSimError::InvalidArgument(_))
        ));
        assert!(matches!(
            FragmentList::new(&["Xpt_array_unit", ""]),
            Err(LdoSimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fragment_list_agrees_with_matches() {
        let lines: [&[&str]; 3] = [&LINE, &["R1", "a", "b"], &[]];
        let fragment_sets: [&[&str]; 3] = [&["ctrl_word", "zzz"], &["zzz"], &["INCLUDE", "ENDS"]];
        for fragments in fragment_sets {
            let list = FragmentList::new(fragments).unwrap();
            for tokens in lines {
                for mode in [MatchMode::Disable, MatchMode::Keep] {
                    assert_eq!(
                        list.matches(tokens, mode),
                        matches(tokens, fragments, mode).unwrap()
                    );
                }
            }
        }
    }
}
