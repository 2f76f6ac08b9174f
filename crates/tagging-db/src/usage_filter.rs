//! Splicing of host-supplied usage filters into tag queries.
//!
//! A [`SqlFilter`] numbers its placeholders from `$1`. Before it joins a
//! query that already uses `param_offset` parameters, every `$n` becomes
//! `$(n + param_offset)` and its params are bound after the query's own.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::Postgres;

use tagging_core::{Error, QueryParam, Result, SqlFilter, UsageFilter};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"));

/// Shift every `$n` in `clause` by `param_offset`.
///
/// Fails when a placeholder is `$0` or refers past `param_count`.
pub fn renumber_placeholders(clause: &str, param_offset: usize, param_count: usize) -> Result<String> {
    for caps in PLACEHOLDER_RE.captures_iter(clause) {
        let n: usize = caps[1]
            .parse()
            .map_err(|_| Error::InvalidInput(format!("bad placeholder {}", &caps[0])))?;
        if n == 0 || n > param_count {
            return Err(Error::InvalidInput(format!(
                "placeholder {} has no matching parameter ({} given)",
                &caps[0], param_count
            )));
        }
    }

    Ok(PLACEHOLDER_RE
        .replace_all(clause, |caps: &Captures| {
            // Digits were validated above.
            let n: usize = caps[1].parse().unwrap_or_default();
            format!("${}", n + param_offset)
        })
        .into_owned())
}

/// Build the `AND ...` clause restricting counted entities.
///
/// Returns the clause (empty without a filter) and the params to bind
/// after the first `param_offset` ones.
pub(crate) fn filter_clause(
    filter: Option<&UsageFilter>,
    param_offset: usize,
) -> Result<(String, Vec<QueryParam>)> {
    match filter {
        None => Ok((String::new(), Vec::new())),
        Some(UsageFilter::Entities(ids)) => Ok((
            format!("AND ti.entity_id = ANY(${})", param_offset + 1),
            vec![QueryParam::IntArray(ids.clone())],
        )),
        Some(UsageFilter::Sql(SqlFilter { clause, params })) => {
            if clause.trim().is_empty() {
                return Ok((String::new(), Vec::new()));
            }
            let clause = renumber_placeholders(clause, param_offset, params.len())?;
            Ok((format!("AND ({})", clause), params.clone()))
        }
    }
}

/// Bind filter parameters in order.
pub(crate) fn bind_params<'q, O>(
    mut q: QueryAs<'q, Postgres, O, PgArguments>,
    params: &'q [QueryParam],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        q = match param {
            QueryParam::Int(val) => q.bind(val),
            QueryParam::IntArray(vals) => q.bind(vals),
            QueryParam::Float(val) => q.bind(val),
            QueryParam::Bool(b) => q.bind(b),
            QueryParam::String(s) => q.bind(s),
            QueryParam::StringArray(arr) => q.bind(arr),
        };
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumber_shifts_every_placeholder() {
        let clause = "ti.entity_id > $1 AND ti.entity_id < $2 OR ti.entity_id = $1";
        assert_eq!(
            renumber_placeholders(clause, 3, 2).unwrap(),
            "ti.entity_id > $4 AND ti.entity_id < $5 OR ti.entity_id = $4"
        );
    }

    #[test]
    fn test_renumber_handles_multi_digit() {
        let params = 12;
        assert_eq!(renumber_placeholders("$12", 1, params).unwrap(), "$13");
    }

    #[test]
    fn test_renumber_rejects_out_of_range() {
        assert!(matches!(
            renumber_placeholders("ti.entity_id = $2", 1, 1),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            renumber_placeholders("ti.entity_id = $0", 1, 1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_filter_clause_entities() {
        let filter = UsageFilter::Entities(vec![1, 3]);
        let (clause, params) = filter_clause(Some(&filter), 1).unwrap();
        assert_eq!(clause, "AND ti.entity_id = ANY($2)");
        assert_eq!(params, vec![QueryParam::IntArray(vec![1, 3])]);
    }

    #[test]
    fn test_filter_clause_sql() {
        let filter = UsageFilter::Sql(SqlFilter::new(
            "ti.entity_id IN (SELECT id FROM parrot WHERE state = $1)",
            vec![QueryParam::String("late".to_string())],
        ));
        let (clause, params) = filter_clause(Some(&filter), 1).unwrap();
        assert_eq!(
            clause,
            "AND (ti.entity_id IN (SELECT id FROM parrot WHERE state = $2))"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_filter_clause_none() {
        let (clause, params) = filter_clause(None, 1).unwrap();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }
}
