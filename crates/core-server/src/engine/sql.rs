//! Identifier quoting for DuckDB DDL/DML strings built by the per-table
//! engine. Column and table names reaching this module have already
//! been validated against the metadata catalog (they exist, or are
//! about to be created) — this only guards against a literal embedded
//! quote breaking the statement.

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifier() {
        assert_eq!(quote_ident("amount"), "\"amount\"");
    }

    #[test]
    fn escapes_embedded_quote_in_identifier() {
        assert_eq!(quote_ident("weird\"col"), "\"weird\"\"col\"");
    }

    #[test]
    fn escapes_literal_apostrophe() {
        assert_eq!(escape_sql_literal("o'brien"), "o''brien");
    }
}
