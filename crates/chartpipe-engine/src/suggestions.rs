//! Fuzzy matching for template error hints

/// Maximum edit distance for a name to count as a likely typo
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters registered by the engine plus the common builtins
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml",
    "tojson",
    "b64encode",
    "b64decode",
    "quote",
    "squote",
    "nindent",
    "indent",
    "required",
    "empty",
    "haskey",
    "keys",
    "merge",
    "sha256",
    "trunc",
    "trimprefix",
    "trimsuffix",
    "semver_match",
    "default",
    "upper",
    "lower",
    "title",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "sort",
    "unique",
    "map",
    "select",
    "reject",
    "items",
    "int",
    "float",
    "string",
    "list",
    "bool",
    "urlencode",
];

/// Functions registered by the engine plus the builtins
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    "fail", "dict", "list", "get", "coalesce", "ternary", "tostring", "toint", "printf", "range",
    "namespace",
];

/// Top-level template variables
pub const CONTEXT_VARIABLES: &[&str] = &["values", "release", "chart", "capabilities", "template"];

/// Closest candidate within `MAX_SUGGESTION_DISTANCE`, exact matches included
pub fn closest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (strsim::levenshtein(input, c), *c))
        .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest() {
        assert_eq!(closest("toyml", AVAILABLE_FILTERS), Some("toyaml"));
        assert_eq!(closest("value", CONTEXT_VARIABLES), Some("values"));
        assert_eq!(closest("zzzzzzzz", AVAILABLE_FILTERS), None);
    }
}
