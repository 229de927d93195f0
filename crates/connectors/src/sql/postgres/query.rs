use model::execution::job::SourceSpec;

pub const CURSOR_NAME: &str = "migrate_rows";

/// `SELECT <keys, large-text> FROM <owner.table> [WHERE <filter>] ORDER BY <first key>`
pub fn select_statement(source: &SourceSpec) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}",
        source.projection().join(", "),
        source.qualified_table()
    );

    if let Some(filter) = source.filter.as_deref().map(str::trim)
        && !filter.is_empty()
    {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }

    if let Some(first) = source.key_columns.first() {
        sql.push_str(" ORDER BY ");
        sql.push_str(first);
    }

    sql
}

pub fn declare_cursor(select: &str) -> String {
    format!("BEGIN READ ONLY; DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {select}")
}

pub fn fetch_forward(count: usize) -> String {
    format!("FETCH FORWARD {} FROM {CURSOR_NAME}", count.max(1))
}

pub fn close_cursor() -> String {
    format!("CLOSE {CURSOR_NAME}; COMMIT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(filter: Option<&str>) -> SourceSpec {
        SourceSpec {
            owner: Some("legacy".into()),
            table: "contracts".into(),
            key_columns: vec!["contract_no".into(), "rev".into()],
            large_text_columns: vec!["body".into()],
            filter: filter.map(String::from),
        }
    }

    #[test]
    fn select_orders_by_first_key() {
        assert_eq!(
            select_statement(&source(None)),
            "SELECT contract_no, rev, body FROM legacy.contracts ORDER BY contract_no"
        );
    }

    #[test]
    fn filter_is_appended_verbatim() {
        assert_eq!(
            select_statement(&source(Some("status = 'OPEN' AND rev > 1"))),
            "SELECT contract_no, rev, body FROM legacy.contracts \
             WHERE status = 'OPEN' AND rev > 1 ORDER BY contract_no"
        );
    }

    #[test]
    fn blank_filter_is_ignored() {
        assert!(!select_statement(&source(Some("   "))).contains("WHERE"));
    }

    #[test]
    fn fetch_never_asks_for_zero_rows() {
        assert_eq!(fetch_forward(0), "FETCH FORWARD 1 FROM migrate_rows");
    }
}
