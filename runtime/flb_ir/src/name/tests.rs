use super::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_strings_sort_before_ordinals() {
    assert!(Name::string("zzz") < Name::ordinal(i64::MIN));
    assert!(Name::ordinal(-1) < Name::ordinal(0));
    assert!(Name::ordinal(0) > Name::string(""));
}

#[test]
fn test_collation_ignores_case_first() {
    let mut names = vec![
        Name::string("cherry"),
        Name::string("Banana"),
        Name::string("apple"),
        Name::ordinal(2),
        Name::ordinal(1),
    ];
    names.sort();
    assert_eq!(
        names,
        vec![
            Name::string("apple"),
            Name::string("Banana"),
            Name::string("cherry"),
            Name::ordinal(1),
            Name::ordinal(2),
        ]
    );
}

#[test]
fn test_case_variants_are_distinct_but_adjacent() {
    let upper = Name::string("Abc");
    let lower = Name::string("abc");
    assert!(upper != lower);
    assert!(upper < lower);
    assert!(lower < Name::string("abd"));
}

#[test]
fn test_display() {
    assert_eq!(Name::string("foo_bar1").to_string(), "foo_bar1");
    assert_eq!(Name::ordinal(3).to_string(), "Attribute(3)");
    assert_eq!(Name::string("Not ok").to_string(), "Attribute(\"Not ok\")");
    assert_eq!(Name::string("a\"b").to_string(), "Attribute(\"a\\\"b\")");
}

#[test]
fn test_identifier_check() {
    assert!(Name::string("x").is_identifier());
    assert!(!Name::string("X").is_identifier());
    assert!(!Name::string("").is_identifier());
    assert!(!Name::ordinal(1).is_identifier());
}

fn any_name() -> impl Strategy<Value = Name> {
    prop_oneof![
        any::<i64>().prop_map(Name::ordinal),
        (-3i64..3).prop_map(Name::ordinal),
        "[a-cA-C_]{0,3}".prop_map(Name::string),
        any::<String>().prop_map(Name::from),
    ]
}

proptest! {
    #[test]
    fn test_order_is_antisymmetric(a in any_name(), b in any_name()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
    }

    #[test]
    fn test_order_is_transitive(a in any_name(), b in any_name(), c in any_name()) {
        let triples = [
            (&a, &b, &c),
            (&a, &c, &b),
            (&b, &a, &c),
            (&b, &c, &a),
            (&c, &a, &b),
            (&c, &b, &a),
        ];
        for (x, y, z) in triples {
            if x <= y && y <= z {
                prop_assert!(x <= z);
            }
        }
    }
}
