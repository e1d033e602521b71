use crate::migration::{Migration, MigrationList};

/// The lowest-versioned migration strictly above `current`.
///
/// `None` means there is nothing left to run. That is the normal terminal
/// state of every run, not a failure.
pub fn next(migrations: &MigrationList, current: i64) -> Option<&Migration> {
    let slice = migrations.as_slice();
    let idx = slice.partition_point(|m| m.version() <= current);
    slice.get(idx)
}

/// Migrations that `apply_all_unapplied` would run, in order.
pub fn unapplied<'a>(
    migrations: &'a MigrationList,
    applied: &'a std::collections::BTreeSet<i64>,
) -> impl Iterator<Item = &'a Migration> + 'a {
    migrations
        .iter()
        .filter(move |m| !applied.contains(&m.version()))
}
