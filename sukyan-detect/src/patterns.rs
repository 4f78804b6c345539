//! Response signature tables for [`sukyan_types::ResponseCheckKind`]
//! (SPEC_FULL §2 supplemented feature -- no source corpus to mine these
//! from, so the tables below are the common, widely-published database-
//! and XPath-error fingerprints).

use once_cell::sync::Lazy;
use regex::RegexSet;
use sukyan_types::ResponseCheckKind;

static DATABASE_ERROR_SIGNATURES: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)you have an error in your sql syntax",
        r"(?i)sql syntax.*mysql",
        r"(?i)sql syntax error",
        r"(?i)warning.*\Wmysqli?_",
        r"(?i)valid mysql result",
        r"(?i)check the manual that corresponds to your (mysql|mariadb) server version",
        r"(?i)postgresql.*error",
        r"(?i)warning.*\Wpg_",
        r"(?i)valid postgresql result",
        r"(?i)ora-\d{5}",
        r"(?i)oracle error",
        r"(?i)microsoft ole db provider for odbc drivers",
        r"(?i)unclosed quotation mark after the character string",
        r"(?i)microsoft jet database engine",
        r"(?i)sqlite3?::.*query",
        r"(?i)sqlite_(error|exception)",
        r"(?i)system\.data\.sqlclient\.sqlexception",
        r"(?i)org\.hibernate\.(query|exception)",
        r"(?i)com\.microsoft\.sqlserver\.jdbc",
        r"(?i)unterminated string literal",
        r"(?i)quoted string not properly terminated",
    ])
    .expect("database-error regex set must compile")
});

static XPATH_ERROR_SIGNATURES: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)xpathexception",
        r"(?i)warning.*xpath",
        r"(?i)simplexmlelement::xpath\(\)",
        r"(?i)invalid expression",
        r"(?i)xpath syntax error",
        r"(?i)unterminated string constant",
        r"(?i)system\.xml\.xpath\.xpathexception",
        r"(?i)javax\.xml\.xpath\.xpathexpressionexception",
    ])
    .expect("xpath-error regex set must compile")
});

/// True if `haystack` contains a known signature for `kind`.
pub fn matches_response_check(kind: ResponseCheckKind, haystack: &str) -> bool {
    let set = match kind {
        ResponseCheckKind::DatabaseError => &*DATABASE_ERROR_SIGNATURES,
        ResponseCheckKind::XpathError => &*XPATH_ERROR_SIGNATURES,
    };
    set.is_match(haystack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_syntax_error_is_detected() {
        assert!(matches_response_check(
            ResponseCheckKind::DatabaseError,
            "You have an error in your SQL syntax; check the manual that corresponds to your MySQL server version"
        ));
    }

    #[test]
    fn bare_mysql_syntax_error_without_vendor_name_is_detected() {
        assert!(matches_response_check(
            ResponseCheckKind::DatabaseError,
            "you have an error in your SQL syntax"
        ));
    }

    #[test]
    fn generic_sql_syntax_error_is_detected() {
        assert!(matches_response_check(
            ResponseCheckKind::DatabaseError,
            "sql syntax error"
        ));
    }

    #[test]
    fn postgres_error_is_detected() {
        assert!(matches_response_check(
            ResponseCheckKind::DatabaseError,
            "PostgreSQL. ERROR: syntax error at or near"
        ));
    }

    #[test]
    fn xpath_exception_is_detected() {
        assert!(matches_response_check(
            ResponseCheckKind::XpathError,
            "Warning: SimpleXMLElement::xpath(): Invalid expression"
        ));
    }

    #[test]
    fn unrelated_body_does_not_match() {
        assert!(!matches_response_check(
            ResponseCheckKind::DatabaseError,
            "<html><body>Welcome</body></html>"
        ));
    }
}
