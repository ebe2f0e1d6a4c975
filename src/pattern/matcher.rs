use super::drain::{Template, WILDCARD, split_tokens};

/// Extra delimiters shared with the clusterer's default config.
const EXTRA_DELIMITERS: &[char] = &['|', '=', ','];

/// Find the template a log line instantiates.
///
/// The line and each candidate pattern are tokenised with the clusterer's
/// delimiter rules; a template matches when the token counts agree and every
/// position is either an exact literal match or the wildcard. The first
/// matching candidate in input order wins.
pub fn match_template<'a>(line: &str, templates: &'a [Template]) -> Option<&'a Template> {
    let line_tokens = split_tokens(line, EXTRA_DELIMITERS);

    templates.iter().find(|t| {
        let pattern_tokens = split_tokens(&t.pattern, EXTRA_DELIMITERS);
        matches_tokens(&line_tokens, &pattern_tokens)
    })
}

fn matches_tokens(line_tokens: &[String], pattern_tokens: &[String]) -> bool {
    if line_tokens.len() != pattern_tokens.len() {
        return false;
    }
    pattern_tokens
        .iter()
        .zip(line_tokens)
        .all(|(pattern, token)| pattern == WILDCARD || pattern == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fixed_templates() -> (Uuid, Uuid, Vec<Template>) {
        let id1 = Uuid::from_u128(1);
        let id2 = Uuid::from_u128(2);
        let templates = vec![
            Template {
                id: id1,
                pattern: "INFO server started on port <*>".to_string(),
                count: 4,
            },
            Template {
                id: id2,
                pattern: "ERROR connection <*> to <*>".to_string(),
                count: 2,
            },
        ];
        (id1, id2, templates)
    }

    #[test]
    fn matches_literal_and_wildcard_positions() {
        let (id1, id2, templates) = fixed_templates();

        let matched = match_template("INFO server started on port 8080", &templates)
            .expect("expected a match for the server started line");
        assert_eq!(matched.id, id1);

        let matched = match_template("ERROR connection lost to db-host", &templates)
            .expect("expected a match for the error line");
        assert_eq!(matched.id, id2);
    }

    #[test]
    fn unrelated_lines_do_not_match() {
        let (_, _, templates) = fixed_templates();
        assert!(match_template("DEBUG something else entirely", &templates).is_none());
    }

    #[test]
    fn token_count_must_agree() {
        let (_, _, templates) = fixed_templates();
        assert!(match_template("INFO server started on port", &templates).is_none());
    }

    #[test]
    fn first_candidate_wins_ties() {
        let a = Template {
            id: Uuid::from_u128(10),
            pattern: "<*> <*>".to_string(),
            count: 1,
        };
        let b = Template {
            id: Uuid::from_u128(11),
            pattern: "hello <*>".to_string(),
            count: 1,
        };
        let templates = vec![a.clone(), b];
        let matched = match_template("hello world", &templates).unwrap();
        assert_eq!(matched.id, a.id);
    }

    #[test]
    fn delimiters_are_boundaries_on_both_sides() {
        let templates = vec![Template {
            id: Uuid::from_u128(3),
            pattern: "level <*> took <*> ms".to_string(),
            count: 2,
        }];
        // `=` and `,` split the same way the clusterer splits.
        let matched = match_template("level=warn took 12, ms", &templates);
        assert!(matched.is_some());
    }
}
