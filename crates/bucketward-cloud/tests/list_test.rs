//! Listing and reconciliation through the coordinator

mod common;

use bucketward_cloud::{BucketCoordinator, BucketInfo, BucketStatus, CoordinatorOptions};
use common::{ACCOUNT, RESOURCE_GROUP, Step, TestHarness};

fn names(infos: &[BucketInfo]) -> Vec<(&str, &str, &str, bool)> {
    infos
        .iter()
        .map(|i| {
            (
                i.props.resource_group.as_str(),
                i.props.storage_account.as_str(),
                i.name.as_str(),
                i.managed,
            )
        })
        .collect()
}

#[tokio::test]
async fn test_list_buckets_marks_managed_containers() {
    let h = TestHarness::new();
    h.coordinator.create_bucket("b1").await.unwrap();
    h.gateway.add_container(RESOURCE_GROUP, ACCOUNT, "b2");

    let buckets = h.coordinator.list_buckets().await.unwrap();

    assert_eq!(
        names(&buckets),
        vec![
            (RESOURCE_GROUP, ACCOUNT, "b1", true),
            (RESOURCE_GROUP, ACCOUNT, "b2", false),
        ]
    );
    assert_eq!(buckets[0].status, Some(BucketStatus::Created));
    assert_eq!(buckets[0].cloud, "azure");
    assert_eq!(buckets[1].status, None);
}

#[tokio::test]
async fn test_list_buckets_matches_full_key_only() {
    let h = TestHarness::new();
    h.coordinator.create_bucket("logs").await.unwrap();
    // Same container name under other accounts
    h.gateway.add_container(RESOURCE_GROUP, "acct02", "logs");
    h.gateway.add_container("rg-other", ACCOUNT, "logs");

    let buckets = h.coordinator.list_buckets().await.unwrap();

    assert_eq!(
        names(&buckets),
        vec![
            ("rg-other", ACCOUNT, "logs", false),
            (RESOURCE_GROUP, ACCOUNT, "logs", true),
            (RESOURCE_GROUP, "acct02", "logs", false),
        ]
    );
}

#[tokio::test]
async fn test_list_buckets_order_does_not_depend_on_concurrency() {
    let h = TestHarness::new();
    for (rg, account, name) in [
        ("rg-c", "acct03", "zeta"),
        ("rg-a", "acct01", "alpha"),
        ("rg-a", "acct02", "beta"),
        ("rg-b", "acct01", "gamma"),
        ("rg-b", "acct01", "delta"),
    ] {
        h.gateway.add_container(rg, account, name);
    }

    let mut listings = Vec::new();
    for concurrency in [1, 3, 16] {
        let coordinator = BucketCoordinator::new(
            common::scope(),
            h.gateway.clone(),
            h.store.clone(),
            h.secrets.clone(),
        )
        .with_options(CoordinatorOptions {
            list_concurrency: concurrency,
            ..Default::default()
        });
        let buckets = coordinator.list_buckets().await.unwrap();
        listings.push(
            buckets
                .iter()
                .map(|b| {
                    format!(
                        "{}/{}/{}",
                        b.props.resource_group, b.props.storage_account, b.name
                    )
                })
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(listings[0].len(), 5);
    assert_eq!(listings[0], listings[1]);
    assert_eq!(listings[0], listings[2]);
}

#[tokio::test]
async fn test_list_buckets_propagates_provider_errors() {
    let h = TestHarness::new();
    h.gateway.add_container(RESOURCE_GROUP, ACCOUNT, "b1");
    h.gateway.fail(Step::ListAccounts);

    let err = h.coordinator.list_buckets().await.unwrap_err();

    assert!(err.to_string().contains("list_accounts failed"));
}

#[tokio::test]
async fn test_list_managed_buckets_works_without_provider() {
    let h = TestHarness::new();
    h.coordinator.create_bucket("zulu").await.unwrap();
    h.coordinator.create_bucket("alpha").await.unwrap();
    h.gateway.fail(Step::CreateContainer);
    h.coordinator.create_bucket("mike").await.unwrap_err();
    h.gateway.fail(Step::ListAccounts);
    let calls_before = h.gateway.calls().len();

    let buckets = h.coordinator.list_managed_buckets().await.unwrap();

    assert_eq!(h.gateway.calls().len(), calls_before);
    let listed: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(listed, vec!["alpha", "mike", "zulu"]);
    assert!(buckets.iter().all(|b| b.managed));
    assert_eq!(buckets[1].status, Some(BucketStatus::CreateError));
    assert!(buckets[1].status_msg.as_deref().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn test_list_managed_buckets_is_scoped_to_organization() {
    let h = TestHarness::new();
    h.coordinator.create_bucket("media").await.unwrap();

    let mut scope = common::scope();
    scope.organization_id = 99;
    let other = BucketCoordinator::new(
        scope,
        h.gateway.clone(),
        h.store.clone(),
        h.secrets.clone(),
    );

    assert!(other.list_managed_buckets().await.unwrap().is_empty());
    assert_eq!(h.coordinator.list_managed_buckets().await.unwrap().len(), 1);
}
