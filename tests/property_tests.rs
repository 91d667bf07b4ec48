/// Property-based tests using proptest
/// Tests invariants that should hold for all lead pages and seen-set histories
use crm_lead_allocator::lead_parser::LeadParser;
use crm_lead_allocator::models::Lead;
use crm_lead_allocator::seen_set::{new_leads, SeenSet};
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[A-Z0-9]{1,8}",
        1 => Just(String::new()),
        1 => Just("   ".to_string()),
        1 => Just("No Record Found...".to_string()),
    ]
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-f0-9]{4,12}",
        1 => Just(String::new()),
    ]
}

fn render_page(rows: &[(String, String)]) -> String {
    let body: String = rows
        .iter()
        .map(|(id, token)| {
            format!(
                r#"<tr><td>{}</td><td>name</td><td><input type="checkbox" class="duplicate_id" value="{}"></td></tr>"#,
                id, token
            )
        })
        .collect();
    format!(
        r#"<html><body><table id="domainTable"><tbody>{}</tbody></table></body></html>"#,
        body
    )
}

fn lead(id: &str) -> Lead {
    Lead::new(id, format!("tok-{}", id), "")
}

// Property: Parser filters exactly the invalid rows and keeps document order
proptest! {
    #[test]
    fn parser_never_panics(html in "\\PC*") {
        let _ = LeadParser::new().unwrap().parse(&html);
    }

    #[test]
    fn parser_keeps_only_valid_rows(rows in prop::collection::vec((identifier(), token()), 0..12)) {
        let leads = LeadParser::new().unwrap().parse(&render_page(&rows));

        let expected: Vec<(String, String)> = rows
            .iter()
            .filter(|(id, token)| {
                !id.trim().is_empty() && id.trim() != "No Record Found..." && !token.is_empty()
            })
            .map(|(id, token)| (id.trim().to_string(), token.clone()))
            .collect();
        let actual: Vec<(String, String)> = leads
            .into_iter()
            .map(|l| (l.id, l.allocation_token))
            .collect();

        prop_assert_eq!(actual, expected);
    }
}

// Property: Diff is identifier-based and order-preserving
proptest! {
    #[test]
    fn diff_matches_filter_definition(
        current in prop::collection::vec("[a-h]", 0..16),
        seen_ids in prop::collection::vec("[a-h]", 0..8)
    ) {
        let current: Vec<Lead> = current.iter().map(|id| lead(id)).collect();
        let mut seen = SeenSet::new();
        seen.mark_all(&seen_ids.iter().map(|id| lead(id)).collect::<Vec<_>>());

        let expected: Vec<Lead> = current
            .iter()
            .filter(|l| !seen_ids.contains(&l.id))
            .cloned()
            .collect();

        prop_assert_eq!(new_leads(&current, &seen), expected);
    }
}

// Property: Seen-set only grows and never forgets
proptest! {
    #[test]
    fn seen_set_is_monotonic(cycles in prop::collection::vec(prop::collection::vec("[a-z]{1,3}", 0..6), 1..10)) {
        let mut seen = SeenSet::new();
        let mut previous = seen.ids();

        for cycle in cycles {
            let leads: Vec<Lead> = cycle.iter().map(|id| lead(id)).collect();
            seen.mark_all(&leads);

            let current = seen.ids();
            prop_assert!(current.len() >= previous.len());
            prop_assert!(previous.is_subset(&current));
            previous = current;
        }
    }

    #[test]
    fn marking_same_page_twice_is_idempotent(ids in prop::collection::vec("[a-z]{1,3}", 0..10)) {
        let leads: Vec<Lead> = ids.iter().map(|id| lead(id)).collect();
        let mut seen = SeenSet::new();

        seen.mark_all(&leads);
        let once = seen.ids();
        let added = seen.mark_all(&leads);

        prop_assert_eq!(added, 0);
        prop_assert_eq!(seen.ids(), once);
    }
}
