//! Text normalization for view definition comparison.

/// Lower-case, collapse whitespace runs to one space, trim.
pub fn normalize_definition(definition: &str) -> String {
    definition
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column type text compared across servers.
pub(crate) fn normalize_type(formatted: &str) -> String {
    formatted.to_lowercase().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_case_are_ignored() {
        assert_eq!(
            normalize_definition("CREATE VIEW x AS SELECT 1 AS a"),
            normalize_definition("create   view x as select 1 as a")
        );
        assert_eq!(
            normalize_definition("\n  CREATE VIEW x\r\n\tAS SELECT 1 AS a  \n"),
            "create view x as select 1 as a"
        );
    }

    #[test]
    fn test_content_differences_survive() {
        assert_ne!(
            normalize_definition("CREATE VIEW x AS SELECT 1 AS a"),
            normalize_definition("CREATE VIEW x AS SELECT 2 AS a")
        );
    }

    #[test]
    fn test_type_normalization() {
        assert_eq!(normalize_type("DECIMAL(10, 2)"), normalize_type("decimal(10,2)"));
        assert_ne!(normalize_type("nvarchar(50)"), normalize_type("nvarchar(max)"));
    }
}
