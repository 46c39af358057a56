//! Reconciliation of cloud inventory against managed records

use crate::bucket::{BucketInfo, BucketRecord, CloudContainerView, compare_keys};

/// Find the record with exactly the same composite key
///
/// `records` must be sorted by `(resource_group, storage_account, name)`.
pub fn find_managed<'a>(
    records: &'a [BucketRecord],
    view: &CloudContainerView,
) -> Option<&'a BucketRecord> {
    records
        .binary_search_by(|record| compare_keys(record.key_tuple(), view.key_tuple()))
        .ok()
        .map(|idx| &records[idx])
}

/// Annotate every discovered container with its managed status
///
/// The inventory order is preserved. Records are sorted first if the caller
/// handed them over unsorted.
pub fn reconcile(
    inventory: Vec<CloudContainerView>,
    records: &[BucketRecord],
) -> Vec<BucketInfo> {
    let sorted;
    let in_order = records.is_sorted_by(|a, b| compare_keys(a.key_tuple(), b.key_tuple()).is_le());
    let records = if in_order {
        records
    } else {
        tracing::warn!("Managed records were not sorted; sorting before reconciliation");
        let mut owned = records.to_vec();
        owned.sort_by(|a, b| compare_keys(a.key_tuple(), b.key_tuple()));
        sorted = owned;
        &sorted[..]
    };

    inventory
        .into_iter()
        .map(|view| match find_managed(records, &view) {
            Some(record) => BucketInfo::unmanaged(view).with_record(record),
            None => BucketInfo::unmanaged(view),
        })
        .collect()
}
