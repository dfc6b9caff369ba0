//! Separate test suite for using `dimble_value!` in an isolated context,
//! without direct access to dependency `smallvec`

// empty module makes `smallvec` dependency unreachable,
// as would be typical in dependents of `dimble_core`
// unless they include it themselves
mod smallvec {}

#[test]
fn use_dimble_value() {
    use dimble_core::dimble_value;

    // multiple strings with variant, no trailing comma
    let value = dimble_value!(Strs, ["DERIVED".to_string(), "PRIMARY".to_string()]);
    assert_eq!(
        value.strings().unwrap(),
        &["DERIVED".to_owned(), "PRIMARY".to_owned()],
    );
    assert_eq!(value.to_str(), "DERIVED\\PRIMARY");

    // single value with variant
    let value = dimble_value!(F64, 1.25);
    assert_eq!(value.float64().unwrap(), 1.25);

    // numeric values, trailing comma
    let value = dimble_value!(U16, [1, 2, 5,]);
    assert_eq!(value.uint16_slice().unwrap(), &[1, 2, 5]);
    assert_eq!(value.multiplicity(), 3);

    // empty value
    let value = dimble_value!();
    assert!(value.is_empty());
}
