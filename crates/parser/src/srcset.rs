//! `srcset` attribute parsing. One candidate per comma-separated entry; we
//! only need the URL, not the width/density descriptor, so this is a much
//! smaller parser than the full spec grammar.

/// Splits a `srcset` attribute value into the URL portion of each
/// candidate. `parse_srcset("") == []`, `parse_srcset("a 1x, b 2x") ==
/// ["a", "b"]`.
pub fn parse_srcset(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|candidate| {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                return None;
            }
            candidate.split_whitespace().next().map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_candidates() {
        assert_eq!(parse_srcset(""), Vec::<String>::new());
    }

    #[test]
    fn strips_descriptors() {
        assert_eq!(
            parse_srcset("a 1x, b 2x"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn tolerates_ragged_whitespace() {
        assert_eq!(
            parse_srcset("  /img/a.jpg 480w ,/img/b.jpg 800w"),
            vec!["/img/a.jpg".to_string(), "/img/b.jpg".to_string()]
        );
    }
}
