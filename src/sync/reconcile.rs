use std::collections::HashMap;

use crate::document::Document;
use crate::github::{Issue, IssueState};

/// Distinct issue numbers linked from `doc`, in order of first appearance.
pub fn collect_issue_numbers(doc: &Document) -> Vec<u64> {
    let mut numbers: Vec<u64> = Vec::new();
    for span in doc.issue_links() {
        if let Some(number) = span.attrs.issue_number
            && !numbers.contains(&number)
        {
            numbers.push(number);
        }
    }
    numbers
}

/// Bring every issue link in `doc` in line with the fetched issues. Links
/// to issues missing from `issues` are left alone. Returns how many link
/// spans were rewritten.
pub fn reconcile_in_place(doc: &mut Document, issues: &[Issue]) -> usize {
    let states: HashMap<u64, IssueState> = issues.iter().map(|i| (i.number, i.state)).collect();
    let mut changed = 0;
    for span in doc.issue_links() {
        let Some(&state) = span.attrs.issue_number.and_then(|n| states.get(&n)) else {
            continue;
        };
        if span.attrs.matches_state(state) {
            continue;
        }
        let rewritten = doc.update_link(&span, |attrs| {
            attrs.issue_state = Some(state);
            attrs.ensure_issue_class();
        });
        if rewritten {
            changed += 1;
        }
    }
    changed
}

/// Pure form of [`reconcile_in_place`]: returns the reconciled copy and the
/// number of rewritten links.
pub fn reconcile(doc: &Document, issues: &[Issue]) -> (Document, usize) {
    let mut next = doc.clone();
    let changed = reconcile_in_place(&mut next, issues);
    (next, changed)
}
