//! Pin type vocabulary and the compatibility rule between output and input pins.

/// Wildcard pin type, compatible with every other type.
pub const ANY: &str = "any";

const EQUIVALENCE_CLASSES: &[&[&str]] = &[
    &["string", "text"],
    &["number", "integer", "float"],
    &["object", "json", "dict"],
    &["list", "array"],
];

/// Whether an output pin of `from_type` may feed an input pin of `to_type`.
pub fn compatible(from_type: &str, to_type: &str) -> bool {
    if from_type == ANY || to_type == ANY || from_type == to_type {
        return true;
    }

    EQUIVALENCE_CLASSES
        .iter()
        .any(|class| class.contains(&from_type) && class.contains(&to_type))
}
