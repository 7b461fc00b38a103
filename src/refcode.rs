//! Course reference allocation.
//!
//! A course ref is `SHORTNAME-YEAR-NNN`, where NNN is a per-(template, year)
//! cohort counter inferred from the refs already on file. The same pattern is
//! produced by the desktop app, so historical rows mix with ours.

/// Collapse a template display name into its ref short name:
/// `"FREC 3 – Qualsafe"` -> `"FREC3QUALSAFE"`.
///
/// Every non-alphanumeric character is dropped, not replaced, so separators
/// never leak into the ref and the result is stable across locales.
pub fn template_short_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Next cohort number for a template/year, derived from existing refs.
///
/// Only refs containing the literal `-<year>-` count. Each candidate is split
/// on `-` and its final segment parsed as a non-negative integer; anything
/// that does not parse is legacy noise and is skipped rather than failing the
/// allocation. The result is max + 1, or 1 when the year has no cohorts yet.
pub fn next_cohort_number(existing_refs: &[String], year: i32) -> i64 {
    let marker = format!("-{}-", year);
    let max = existing_refs
        .iter()
        .filter(|r| r.contains(&marker))
        .filter_map(|r| {
            let parts: Vec<&str> = r.split('-').collect();
            if parts.len() < 3 {
                return None;
            }
            parts.last()?.parse::<i64>().ok().filter(|n| *n >= 0)
        })
        .max();

    match max {
        Some(n) => n + 1,
        None => 1,
    }
}

/// Render the full ref. Cohorts are zero-padded to three digits; a cohort
/// past 999 keeps all its digits instead of wrapping or truncating.
pub fn course_ref(short_name: &str, year: i32, cohort: i64) -> String {
    format!("{}-{}-{:03}", short_name, year, cohort)
}
