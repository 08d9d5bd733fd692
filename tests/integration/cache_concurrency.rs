//! Single-flight behaviour of the artifact cache under real concurrency.

use futures::future::join_all;
use quire::cache::{ArtifactCache, CacheConfig, CachedArtifact, Origin};
use quire::error::{BackendError, CacheError};
use quire::fingerprint::Fingerprint;
use quire::request::{GenerationRequest, SamplingParams};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fingerprint_for(section: &str) -> Fingerprint {
    GenerationRequest {
        entry_id: "basil".to_string(),
        section_id: section.to_string(),
        model: "scripted".to_string(),
        prompt: format!("write {section}"),
        sampling: SamplingParams::default(),
        min_words: 0,
        max_words: None,
    }
    .fingerprint()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_callers_one_compute() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap());
    let computes = Arc::new(AtomicUsize::new(0));
    let fp = fingerprint_for("origins");

    let tasks = (0..32).map(|_| {
        let cache = cache.clone();
        let computes = computes.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    computes.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BackendError>(CachedArtifact::new(fp, "shared text".to_string(), None))
                })
                .await
        })
    });
    let results = join_all(tasks).await;

    assert_eq!(computes.load(Ordering::SeqCst), 1);
    let mut computed = 0;
    for result in results {
        let resolved = result.unwrap().unwrap();
        assert_eq!(resolved.artifact.text, "shared text");
        if resolved.origin == Origin::Computed {
            computed += 1;
        }
    }
    assert_eq!(computed, 1);

    let stats = cache.stats();
    assert_eq!(stats.computes, 1);
    assert_eq!(cache.disk_usage().unwrap().records, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_fingerprints_compute_independently() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap());
    let computes = Arc::new(AtomicUsize::new(0));

    let tasks = ["origins", "growth", "legacy", "origins", "growth", "legacy"]
        .into_iter()
        .map(|section| {
            let cache = cache.clone();
            let computes = computes.clone();
            let fp = fingerprint_for(section);
            tokio::spawn(async move {
                cache
                    .get_or_compute(fp, || async move {
                        computes.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, BackendError>(CachedArtifact::new(fp, section.to_string(), None))
                    })
                    .await
            })
        });
    let results = join_all(tasks).await;

    assert_eq!(computes.load(Ordering::SeqCst), 3);
    let mut texts: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().artifact.text.clone())
        .collect();
    texts.sort();
    assert_eq!(
        texts,
        vec!["growth", "growth", "legacy", "legacy", "origins", "origins"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_reaches_every_waiter_and_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap());
    let fp = fingerprint_for("origins");

    let tasks = (0..8).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<CachedArtifact, _>(BackendError::Transient("connection reset".to_string()))
                })
                .await
        })
    });
    for result in join_all(tasks).await {
        assert!(matches!(
            result.unwrap(),
            Err(CacheError::Compute(BackendError::Transient(_)))
        ));
    }
    assert!(cache.get(&fp).is_none());

    let retried = cache
        .get_or_compute(fp, || async {
            Ok::<_, BackendError>(CachedArtifact::new(fp, "second try".to_string(), None))
        })
        .await
        .unwrap();
    assert_eq!(retried.origin, Origin::Computed);
}

#[tokio::test]
async fn test_cold_tier_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let fp = fingerprint_for("legacy");
    {
        let cache = ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap();
        let resolved = cache
            .get_or_compute(fp, || async {
                Ok::<_, BackendError>(CachedArtifact::new(fp, "kept".to_string(), None))
            })
            .await
            .unwrap();
        assert!(resolved.durable);
    }

    let reopened = ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap();
    let resolved = reopened
        .get_or_compute(fp, || async {
            Err::<CachedArtifact, _>(BackendError::Rejected("must not run".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(resolved.origin, Origin::Cold);
    assert_eq!(resolved.artifact.text, "kept");
}
