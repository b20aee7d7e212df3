//! The conformance suite

use crate::dsl::FlowCase;
use crate::{FlowError, FlowResult};

const SUITE: [(&str, &str); 29] = [
    ("simpleIf1", "simpleIf: 1 2 4"),
    ("simpleIf2", "simpleIf: !1 3 4"),
    // every true/false combination of the conditionals at 1 2 6 8 12 15
    ("complexIf1", "complexIf: 1 2 3 5 6 7 8 9 18"),
    ("complexIf2", "complexIf: 1 2 3 5 6 7 !8 10 18"),
    ("complexIf3", "complexIf: 1 2 3 5 !6 11 18"),
    ("complexIf4", "complexIf: 1 !2 4 5 6 7 8 9 18"),
    ("complexIf5", "complexIf: 1 !2 4 5 6 7 !8 10 18"),
    ("complexIf6", "complexIf: 1 !2 4 5 !6 11 18"),
    ("complexIf7", "complexIf: !1 12 13 18"),
    ("complexIf8", "complexIf: !1 !12 14 15 16 18"),
    ("complexIf9", "complexIf: !1 !12 14 !15 17 18"),
    ("simpleTryCatch1", "simpleTryCatch: 1 2 3 6"),
    (
        "simpleTryCatch2",
        "simpleTryCatch: 1!FirstException => FirstException",
    ),
    ("simpleTryCatch3", "simpleTryCatch: 1 2!FirstException 4 5 6"),
    ("simpleTryCatch4", "simpleTryCatch: 1 2 3!FirstException 4 5 6"),
    (
        "simpleTryCatch5",
        "simpleTryCatch: 1 2 3!FirstException 4 5!SecondException => SecondException",
    ),
    (
        "simpleTryCatch6",
        "simpleTryCatch: 1 2!SecondException => SecondException",
    ),
    ("nestedTryCatch1", "nestedTryCatch: 1 2 4 6"),
    ("nestedTryCatch2", "nestedTryCatch: 1 2!SecondException 3 4 6"),
    ("nestedTryCatch3", "nestedTryCatch: 1 2!FirstException 5 6"),
    (
        "nestedTryCatch4",
        "nestedTryCatch: 1 2!SecondException 3!FirstException 5 6",
    ),
    (
        "nestedTryCatch5",
        "nestedTryCatch: 1 2 4!SecondException => SecondException",
    ),
    ("ifInCatch1", "ifInCatch: 1 5"),
    ("ifInCatch2", "ifInCatch: 1!FirstException 2 3 5"),
    ("ifInCatch3", "ifInCatch: 1!FirstException !2 4 5"),
    (
        "ifInCatch4",
        "ifInCatch: 1!FirstException 2!SecondException => SecondException",
    ),
    ("branchTrue", "branch(true): 1"),
    ("branchFalse", "branch(false): 2"),
    ("tryThrow", "tryThrow: 1 2"),
];

/// Every case of the suite in declaration order
pub fn suite() -> FlowResult<Vec<FlowCase>> {
    SUITE
        .iter()
        .map(|(name, text)| FlowCase::parse(name, text))
        .collect()
}

/// Cases whose name, or whose method, equals `filter`; all cases for `None`
pub fn select(filter: Option<&str>) -> FlowResult<Vec<FlowCase>> {
    let cases = suite()?;
    let Some(filter) = filter else {
        return Ok(cases);
    };
    let selected: Vec<_> = cases
        .into_iter()
        .filter(|case| case.name == filter || case.method == filter)
        .collect();
    if selected.is_empty() {
        return Err(FlowError::UnknownCase(filter.to_string()));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::flow_methods;

    #[test]
    fn test_suite_parses() {
        let cases = suite().unwrap();
        assert_eq!(cases.len(), SUITE.len());
        for case in &cases {
            assert!(
                flow_methods().any(|method| method == case.method),
                "{} calls unknown method {}",
                case.name,
                case.method
            );
        }
    }

    #[test]
    fn test_select() {
        assert_eq!(select(Some("complexIf")).unwrap().len(), 9);
        assert_eq!(select(Some("simpleIf2")).unwrap().len(), 1);
        assert!(matches!(select(Some("nothing")), Err(FlowError::UnknownCase(_))));
        assert_eq!(select(None).unwrap().len(), SUITE.len());
    }
}
