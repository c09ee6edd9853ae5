//! End-to-end rental lifecycle against the in-memory store and provisioners.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use rewind_core::AppError;
use rewind_core::config::{RentalConfig, TierTerms};
use rewind_core::events::{EventPayload, RentalEvent};
use rewind_core::result::AppResult;
use rewind_core::traits::{AccessPoint, AccessProvisioner, AssetKind, MediaAssets, StreamingUrl};
use rewind_core::types::{AccessToken, FilmId, RentalId, UserId};
use rewind_database::MemoryStore;
use rewind_database::store::{CreditLedger, RentalStore};
use rewind_entity::credit::CreditReason;
use rewind_entity::film::FilmListing;
use rewind_entity::rental::{RentalEndReason, RentalTier, ViewingMode};
use rewind_service::{EventBus, RentalError, RentalService, ViewingChoice};
use rewind_storage::providers::MemoryProvisioner;

struct Harness {
    service: RentalService,
    store: Arc<MemoryStore>,
    access: Arc<dyn AccessProvisioner>,
    _media: TempDir,
}

fn media_dir() -> TempDir {
    let media = tempfile::tempdir().unwrap();
    std::fs::write(media.path().join("feature.mp4"), b"primary").unwrap();
    std::fs::write(media.path().join("feature.dub.mp4"), b"alternate").unwrap();
    std::fs::write(media.path().join("feature.vtt"), b"WEBVTT").unwrap();
    media
}

fn build(media: TempDir, access: Arc<dyn AccessProvisioner>) -> Harness {
    build_with(media, access, RentalConfig::default())
}

fn build_with(media: TempDir, access: Arc<dyn AccessProvisioner>, config: RentalConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let service = RentalService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        access.clone(),
        config,
        EventBus::new(64),
    );
    Harness {
        service,
        store,
        access,
        _media: media,
    }
}

fn harness() -> Harness {
    let media = media_dir();
    let access = Arc::new(MemoryProvisioner::new(media.path(), "https://stream.test/v"));
    build(media, access)
}

/// Memory provisioner whose grant can be held open and whose revokes can
/// be made to fail.
#[derive(Debug)]
struct FaultyProvisioner {
    inner: MemoryProvisioner,
    pause_next_grant: AtomicBool,
    grant_reached: Notify,
    grant_release: Notify,
    fail_revokes: AtomicBool,
    failing_tokens: std::sync::Mutex<HashSet<AccessToken>>,
}

impl FaultyProvisioner {
    fn new(inner: MemoryProvisioner) -> Self {
        Self {
            inner,
            pause_next_grant: AtomicBool::new(false),
            grant_reached: Notify::new(),
            grant_release: Notify::new(),
            fail_revokes: AtomicBool::new(false),
            failing_tokens: std::sync::Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl AccessProvisioner for FaultyProvisioner {
    fn provider_type(&self) -> &str {
        "faulty"
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn grant(
        &self,
        token: &AccessToken,
        assets: &MediaAssets,
    ) -> AppResult<Vec<StreamingUrl>> {
        let urls = self.inner.grant(token, assets).await?;
        if self.pause_next_grant.swap(false, Ordering::SeqCst) {
            self.grant_reached.notify_one();
            self.grant_release.notified().await;
        }
        Ok(urls)
    }

    async fn revoke(&self, token: &AccessToken) -> AppResult<()> {
        if self.fail_revokes.load(Ordering::SeqCst)
            || self.failing_tokens.lock().unwrap().contains(token)
        {
            return Err(AppError::storage("access root is read-only"));
        }
        self.inner.revoke(token).await
    }

    async fn resolve(&self, token: &str, asset_name: &str) -> AppResult<PathBuf> {
        self.inner.resolve(token, asset_name).await
    }

    async fn tokens(&self) -> AppResult<Vec<AccessToken>> {
        self.inner.tokens().await
    }

    async fn inspect(&self, token: &AccessToken) -> AppResult<Option<AccessPoint>> {
        self.inner.inspect(token).await
    }
}

fn faulty_harness() -> (Harness, Arc<FaultyProvisioner>) {
    let media = media_dir();
    let faulty = Arc::new(FaultyProvisioner::new(MemoryProvisioner::new(
        media.path(),
        "https://stream.test/v",
    )));
    (build(media, faulty.clone()), faulty)
}

fn listing(id: FilmId, release_year: i32, assets: MediaAssets) -> FilmListing {
    let path = |p: Option<PathBuf>| p.map(|p| p.to_string_lossy().into_owned());
    FilmListing {
        id,
        title: "The Long Rewind".into(),
        release_year: Some(release_year),
        is_available: true,
        primary_audio_path: path(assets.primary_audio),
        alt_audio_path: path(assets.alt_audio),
        subtitle_path: path(assets.subtitle),
    }
}

impl Harness {
    async fn film(&self, release_year: i32, assets: MediaAssets) -> FilmId {
        let id = FilmId::new();
        self.store.upsert_film(listing(id, release_year, assets)).await;
        id
    }

    async fn standard_film(&self) -> FilmId {
        self.film(standard_year(), primary_only()).await
    }

    async fn user_with(&self, credits: i64) -> UserId {
        let user = UserId::new();
        self.store.set_balance(user, credits).await;
        user
    }

    async fn balance(&self, user: UserId) -> i64 {
        self.store.balance(user).await.unwrap()
    }
}

fn standard_year() -> i32 {
    Utc::now().year() - 10
}

fn primary_only() -> MediaAssets {
    MediaAssets {
        primary_audio: Some("feature.mp4".into()),
        ..Default::default()
    }
}

fn all_assets() -> MediaAssets {
    MediaAssets {
        primary_audio: Some("feature.mp4".into()),
        alt_audio: Some("feature.dub.mp4".into()),
        subtitle: Some("feature.vtt".into()),
    }
}

#[tokio::test]
async fn standard_rental_scenario() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    let grant = h.service.request_rental(user, film).await.unwrap();
    let rental = &grant.rental;
    assert!(rental.is_active);
    assert_eq!(rental.viewing_mode, ViewingMode::Unset);
    assert_eq!(rental.tier, RentalTier::Standard);
    assert_eq!(rental.expires_at, rental.rented_at + Duration::hours(72));
    assert_eq!(h.balance(user).await, 0);

    assert_eq!(grant.streaming_urls.len(), 1);
    let url = &grant.streaming_urls[0];
    assert_eq!(url.kind, AssetKind::Primary);
    let token = rental.access_token.unwrap();
    assert_eq!(url.url, format!("https://stream.test/v/{token}/primary.mp4"));

    let again = h.service.request_rental(user, film).await.unwrap();
    assert_eq!(again.rental.id, rental.id);
    assert_eq!(again.streaming_urls, grant.streaming_urls);
    assert_eq!(h.balance(user).await, 0);
    assert_eq!(h.access.tokens().await.unwrap(), vec![token]);
}

#[tokio::test]
async fn tiers_drive_cost_and_duration() {
    let h = harness();
    let recent = h.film(Utc::now().year(), primary_only()).await;
    let classic = h.film(Utc::now().year() - 40, all_assets()).await;
    let user = h.user_with(3).await;

    let r = h.service.request_rental(user, recent).await.unwrap().rental;
    assert_eq!((r.tier, r.cost), (RentalTier::Recent, 2));
    assert_eq!(r.expires_at - r.rented_at, Duration::hours(48));

    let grant = h.service.request_rental(user, classic).await.unwrap();
    assert_eq!(grant.rental.tier, RentalTier::Classic);
    assert_eq!(grant.rental.expires_at - grant.rental.rented_at, Duration::hours(168));
    let names: Vec<_> = grant.streaming_urls.iter().map(|u| u.asset_name.as_str()).collect();
    assert_eq!(names, vec!["primary.mp4", "alternate.mp4", "subtitles.vtt"]);
    assert_eq!(h.balance(user).await, 0);
}

#[tokio::test]
async fn other_user_is_refused_and_keeps_credits() {
    let h = harness();
    let film = h.standard_film().await;
    let alice = h.user_with(1).await;
    let bob = h.user_with(5).await;

    h.service.request_rental(alice, film).await.unwrap();
    let err = h.service.request_rental(bob, film).await.unwrap_err();
    assert!(matches!(err, RentalError::AlreadyRented), "{err:?}");
    assert_eq!(err.code(), "ALREADY_RENTED");
    assert_eq!(h.balance(bob).await, 5);
    assert_eq!(h.access.tokens().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_have_one_winner() {
    let h = harness();
    let film = h.standard_film().await;
    let mut users = Vec::new();
    for _ in 0..8 {
        users.push(h.user_with(1).await);
    }

    let attempts = users.iter().map(|&user| {
        let service = h.service.clone();
        tokio::spawn(async move { (user, service.request_rental(user, film).await) })
    });
    let results = futures::future::join_all(attempts).await;

    let mut winners = Vec::new();
    for joined in results {
        let (user, result) = joined.unwrap();
        match result {
            Ok(grant) => winners.push((user, grant.rental.id)),
            Err(RentalError::AlreadyRented) => assert_eq!(h.balance(user).await, 1),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    let (winner, rental_id) = winners[0];
    assert_eq!(h.balance(winner).await, 0);

    let active = h.service.active_rental_for_film(film).await.unwrap().unwrap();
    assert_eq!(active.id, rental_id);
    // every loser's access point was revoked
    assert_eq!(h.access.tokens().await.unwrap(), vec![active.access_token.unwrap()]);
}

#[tokio::test]
async fn failed_store_write_rolls_back_everything() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    h.store.fail_next_insert();
    let err = h.service.request_rental(user, film).await.unwrap_err();
    assert!(matches!(err, RentalError::Internal(_)), "{err:?}");

    assert_eq!(h.balance(user).await, 1);
    assert!(h.service.active_rental_for_film(film).await.unwrap().is_none());
    assert!(h.service.history_for_holder(user).await.unwrap().is_empty());
    assert!(h.access.tokens().await.unwrap().is_empty());

    // and the user can simply retry
    h.service.request_rental(user, film).await.unwrap();
    assert_eq!(h.balance(user).await, 0);
}

#[tokio::test]
async fn refusals_before_provisioning() {
    let h = harness();
    let film = h.film(Utc::now().year(), primary_only()).await;
    let broke = h.user_with(1).await;

    let err = h.service.request_rental(broke, film).await.unwrap_err();
    assert!(matches!(
        err,
        RentalError::InsufficientCredits {
            required: 2,
            balance: 1
        }
    ));

    let err = h
        .service
        .request_rental(broke, FilmId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::NotAvailable));

    let withdrawn = FilmId::new();
    h.store
        .upsert_film(FilmListing {
            id: withdrawn,
            title: "Withdrawn".into(),
            release_year: None,
            is_available: false,
            primary_audio_path: Some("feature.mp4".into()),
            alt_audio_path: None,
            subtitle_path: None,
        })
        .await;
    let err = h.service.request_rental(broke, withdrawn).await.unwrap_err();
    assert!(matches!(err, RentalError::NotAvailable));
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_media_is_a_provision_failure() {
    let h = harness();
    let film = h
        .film(
            standard_year(),
            MediaAssets {
                primary_audio: Some("feature.mp4".into()),
                subtitle: Some("missing.srt".into()),
                ..Default::default()
            },
        )
        .await;
    let user = h.user_with(1).await;

    let err = h.service.request_rental(user, film).await.unwrap_err();
    assert_eq!(err.code(), "PROVISION_FAILURE");
    assert_eq!(h.balance(user).await, 1);
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn unrepresentable_window_is_refused_before_provisioning() {
    let media = media_dir();
    let access = Arc::new(MemoryProvisioner::new(media.path(), "https://stream.test/v"));
    let h = build_with(
        media,
        access,
        RentalConfig {
            standard: TierTerms {
                cost: 1,
                duration_hours: i64::MAX,
            },
            ..Default::default()
        },
    );
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    let err = h.service.request_rental(user, film).await.unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert_eq!(h.balance(user).await, 1);
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn unrevocable_compensation_is_a_provision_failure() {
    let (h, faulty) = faulty_harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    h.store.fail_next_insert();
    faulty.fail_revokes.store(true, Ordering::SeqCst);
    let err = h.service.request_rental(user, film).await.unwrap_err();
    assert_eq!(err.code(), "PROVISION_FAILURE");
    assert_eq!(h.balance(user).await, 1);
    assert!(h.service.active_rental_for_film(film).await.unwrap().is_none());

    // the access point outlives the failed admission until recovery runs
    let leftover = h.access.tokens().await.unwrap();
    assert_eq!(leftover.len(), 1);

    faulty.fail_revokes.store(false, Ordering::SeqCst);
    let report = h
        .service
        .recovery()
        .reconcile_at(Utc::now() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!((report.orphaned, report.revoked), (1, 1));
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn balance_spent_during_grant_is_refused_at_commit() {
    let (h, faulty) = faulty_harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    faulty.pause_next_grant.store(true, Ordering::SeqCst);
    let service = h.service.clone();
    let admission = tokio::spawn(async move { service.request_rental(user, film).await });
    faulty.grant_reached.notified().await;

    // the up-front balance check already passed
    h.store.set_balance(user, 0).await;
    faulty.grant_release.notify_one();

    let err = admission.await.unwrap().unwrap_err();
    assert!(
        matches!(
            err,
            RentalError::InsufficientCredits {
                required: 1,
                balance: 0
            }
        ),
        "{err:?}"
    );
    assert!(h.access.tokens().await.unwrap().is_empty());
    assert!(h.service.active_rental_for_film(film).await.unwrap().is_none());
    assert_eq!(h.balance(user).await, 0);
}

#[tokio::test]
async fn sweep_counts_a_failed_revoke_and_retires_the_rest() {
    let (h, faulty) = faulty_harness();
    let stuck_film = h.standard_film().await;
    let other_film = h.standard_film().await;
    let user = h.user_with(2).await;
    let stuck = h.service.request_rental(user, stuck_film).await.unwrap().rental;
    h.service.request_rental(user, other_film).await.unwrap();

    faulty
        .failing_tokens
        .lock()
        .unwrap()
        .insert(stuck.access_token.unwrap());
    let later = Utc::now() + Duration::days(4);

    let first = h.service.expiry().sweep_at(later).await.unwrap();
    assert_eq!((first.examined, first.expired, first.failed), (2, 1, 1));
    let still_held = h.service.active_rental_for_film(stuck_film).await.unwrap();
    assert_eq!(still_held.map(|r| r.id), Some(stuck.id));
    assert!(h.service.active_rental_for_film(other_film).await.unwrap().is_none());
    assert_eq!(h.access.tokens().await.unwrap(), vec![stuck.access_token.unwrap()]);

    faulty.failing_tokens.lock().unwrap().clear();
    let second = h.service.expiry().sweep_at(later).await.unwrap();
    assert_eq!((second.examined, second.expired, second.failed), (1, 1, 0));
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_converges_and_is_repeatable() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let grant = h.service.request_rental(user, film).await.unwrap();
    let token = grant.rental.access_token.unwrap().to_string();
    let later = Utc::now() + Duration::hours(73);

    assert_eq!(h.service.expiry().sweep().await.unwrap().examined, 0);

    let first = h.service.expiry().sweep_at(later).await.unwrap();
    assert_eq!((first.examined, first.expired, first.failed), (1, 1, 0));

    let rental = h.service.get(grant.rental.id).await.unwrap();
    assert!(!rental.is_active);
    assert!(rental.access_token.is_none());
    assert_eq!(rental.end_reason, Some(RentalEndReason::Expired));
    assert!(
        h.access
            .resolve(&token, "primary.mp4")
            .await
            .unwrap_err()
            .is_not_found()
    );

    let second = h.service.expiry().sweep_at(later).await.unwrap();
    assert_eq!(second.examined, 0);
    assert_eq!(h.service.get(grant.rental.id).await.unwrap(), rental);
    assert_eq!(h.balance(user).await, 0);

    // the copy is free again
    let next = h.user_with(1).await;
    h.service.request_rental(next, film).await.unwrap();
}

#[tokio::test]
async fn stale_rental_blocks_until_swept() {
    let h = harness();
    let film = h.standard_film().await;
    let alice = h.user_with(1).await;
    let grant = h.service.request_rental(alice, film).await.unwrap();
    assert!(
        h.store
            .find_stale(Utc::now() + Duration::hours(80))
            .await
            .unwrap()
            .iter()
            .any(|r| r.id == grant.rental.id)
    );

    let bob = h.user_with(1).await;
    assert!(matches!(
        h.service.request_rental(bob, film).await,
        Err(RentalError::AlreadyRented)
    ));
}

#[tokio::test]
async fn viewing_mode_is_one_shot() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    let rental = h
        .service
        .set_viewing_mode(id, user, ViewingChoice::InStore)
        .await
        .unwrap();
    assert_eq!(rental.viewing_mode, ViewingMode::InStore);

    let err = h
        .service
        .set_viewing_mode(id, user, ViewingChoice::TakeAway)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::AlreadySet));
    assert_eq!(
        h.service.get(id).await.unwrap().viewing_mode,
        ViewingMode::InStore
    );
}

#[tokio::test]
async fn check_order_is_existence_holder_activity() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let stranger = h.user_with(0).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    let err = h
        .service
        .set_viewing_mode(RentalId::new(), user, ViewingChoice::InStore)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::NotFound));

    h.service.expiry().sweep_at(Utc::now() + Duration::days(4)).await.unwrap();

    // ended, but the stranger still learns only that it is not theirs
    let err = h
        .service
        .set_viewing_mode(id, stranger, ViewingChoice::InStore)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::Forbidden));

    let err = h
        .service
        .set_viewing_mode(id, user, ViewingChoice::InStore)
        .await
        .unwrap_err();
    assert!(matches!(err, RentalError::NotActive));
    assert!(matches!(
        h.service.record_progress(id, user, 10).await,
        Err(RentalError::NotActive)
    ));
    assert!(matches!(
        h.service.request_return(id, user).await,
        Err(RentalError::NotActive)
    ));
}

#[tokio::test]
async fn progress_never_goes_backwards() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    h.service.record_progress(id, user, 40).await.unwrap();
    let rental = h.service.record_progress(id, user, 30).await.unwrap();
    assert_eq!(rental.watch_progress_percent, 40);
    let rental = h.service.record_progress(id, user, -5).await.unwrap();
    assert_eq!(rental.watch_progress_percent, 40);
    let rental = h.service.record_progress(id, user, 130).await.unwrap();
    assert_eq!(rental.watch_progress_percent, 100);
}

#[tokio::test]
async fn reward_needs_progress() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    h.service.record_progress(id, user, 89).await.unwrap();
    let err = h.service.claim_rewind_reward(id, user).await.unwrap_err();
    assert!(matches!(
        err,
        RentalError::NotEligible {
            progress: 89,
            threshold: 90
        }
    ));
    assert_eq!(h.balance(user).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_credit_once() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;
    h.service.record_progress(id, user, 95).await.unwrap();

    let claims = (0..6).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move { service.claim_rewind_reward(id, user).await })
    });
    let results = futures::future::join_all(claims).await;

    let ok = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| match r {
            Ok(_) => true,
            Err(RentalError::AlreadyClaimed) => false,
            Err(other) => panic!("unexpected error: {other:?}"),
        })
        .count();
    assert_eq!(ok, 1);
    assert_eq!(h.balance(user).await, 1);

    let rewards: Vec<_> = h
        .store
        .transactions(user)
        .await
        .into_iter()
        .filter(|t| t.reason == CreditReason::RewindReward)
        .collect();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].rental_id, Some(id));

    let err = h.service.claim_rewind_reward(id, user).await.unwrap_err();
    assert!(matches!(err, RentalError::AlreadyClaimed));
}

#[tokio::test]
async fn earned_reward_survives_expiry() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;
    h.service.record_progress(id, user, 100).await.unwrap();
    h.service.expiry().sweep_at(Utc::now() + Duration::days(4)).await.unwrap();

    let rental = h.service.claim_rewind_reward(id, user).await.unwrap();
    assert!(rental.rewind_claimed);
    assert!(!rental.is_active);
    assert_eq!(h.balance(user).await, 1);

    let stranger = h.user_with(0).await;
    assert!(matches!(
        h.service.claim_rewind_reward(id, stranger).await,
        Err(RentalError::Forbidden)
    ));
}

#[tokio::test]
async fn return_request_notifies_once() {
    let h = harness();
    let mut events = h.service.events().subscribe();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    let first = h.service.request_return(id, user).await.unwrap();
    let second = h.service.request_return(id, user).await.unwrap();
    assert!(first.return_requested && second.return_requested);
    assert!(second.is_active);

    let mut requested = 0;
    while let Ok(event) = events.try_recv() {
        let EventPayload::Rental(event) = event.payload;
        if matches!(event, RentalEvent::ReturnRequested { .. }) {
            requested += 1;
        }
    }
    assert_eq!(requested, 1);
}

#[tokio::test]
async fn early_return_tears_down_access() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let grant = h.service.request_rental(user, film).await.unwrap();
    let token = grant.rental.access_token.unwrap();

    let ended = h.service.return_early(grant.rental.id, user).await.unwrap();
    assert!(!ended.is_active);
    assert_eq!(ended.end_reason, Some(RentalEndReason::Returned));
    assert!(ended.ended_at.is_some());
    assert!(h.access.tokens().await.unwrap().is_empty());
    assert!(
        h.access
            .resolve(&token.to_string(), "primary.mp4")
            .await
            .is_err()
    );
    assert!(matches!(
        h.service.return_early(grant.rental.id, user).await,
        Err(RentalError::NotActive)
    ));

    assert!(h.service.active_rentals_for_holder(user).await.unwrap().is_empty());
    assert_eq!(h.service.history_for_holder(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn operator_force_end() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let id = h.service.request_rental(user, film).await.unwrap().rental.id;

    let ended = h.service.force_end(id, "damaged disc").await.unwrap();
    assert_eq!(ended.end_reason, Some(RentalEndReason::ForceEnded));
    assert!(matches!(
        h.service.force_end(id, "again").await,
        Err(RentalError::NotActive)
    ));
    assert!(matches!(
        h.service.force_end(RentalId::new(), "ghost").await,
        Err(RentalError::NotFound)
    ));
}

#[tokio::test]
async fn recovery_revokes_only_orphans() {
    let h = harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;
    let live = h
        .service
        .request_rental(user, film)
        .await
        .unwrap()
        .rental
        .access_token
        .unwrap();

    let orphan = AccessToken::new();
    h.access.grant(&orphan, &primary_only()).await.unwrap();

    // too young to be anything but an admission still committing
    let report = h.service.recovery().reconcile().await.unwrap();
    assert_eq!(
        (report.live, report.orphaned, report.pending, report.revoked),
        (1, 1, 1, 0)
    );
    assert_eq!(h.access.tokens().await.unwrap().len(), 2);

    let report = h
        .service
        .recovery()
        .reconcile_at(Utc::now() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!((report.live, report.orphaned, report.revoked), (1, 1, 1));
    assert_eq!(h.access.tokens().await.unwrap(), vec![live]);
}

#[tokio::test]
async fn recovery_spares_an_admission_mid_grant() {
    let (h, faulty) = faulty_harness();
    let film = h.standard_film().await;
    let user = h.user_with(1).await;

    faulty.pause_next_grant.store(true, Ordering::SeqCst);
    let service = h.service.clone();
    let admission = tokio::spawn(async move { service.request_rental(user, film).await });
    faulty.grant_reached.notified().await;

    // granted, but no rental row references the token yet
    let in_flight = h.access.tokens().await.unwrap();
    assert_eq!(in_flight.len(), 1);
    let report = h.service.recovery().reconcile().await.unwrap();
    assert_eq!((report.orphaned, report.pending, report.revoked), (1, 1, 0));
    for _ in 0..2 {
        assert_eq!(h.service.recovery().audit().await.unwrap().revoked, 0);
    }

    faulty.grant_release.notify_one();
    let grant = admission.await.unwrap().unwrap();
    assert_eq!(grant.rental.access_token, Some(in_flight[0]));
    let path = h
        .access
        .resolve(&in_flight[0].to_string(), "primary.mp4")
        .await
        .unwrap();
    assert!(path.is_file());

    let report = h.service.recovery().reconcile().await.unwrap();
    assert_eq!((report.live, report.orphaned), (1, 0));
}

#[tokio::test]
async fn re_request_returns_urls_the_access_point_serves() {
    let h = harness();
    let film = h.film(standard_year(), all_assets()).await;
    let user = h.user_with(1).await;
    let grant = h.service.request_rental(user, film).await.unwrap();
    assert_eq!(grant.streaming_urls.len(), 3);

    // the catalog entry changes while the rental is live
    h.store
        .upsert_film(listing(film, standard_year(), primary_only()))
        .await;

    let again = h.service.request_rental(user, film).await.unwrap();
    assert_eq!(again.rental.id, grant.rental.id);
    assert_eq!(again.streaming_urls, grant.streaming_urls);
    let token = grant.rental.access_token.unwrap().to_string();
    for url in &again.streaming_urls {
        h.access.resolve(&token, &url.asset_name).await.unwrap();
    }
}

#[tokio::test]
async fn audit_waits_for_a_second_sighting() {
    let media = media_dir();
    let access = Arc::new(MemoryProvisioner::new(media.path(), "https://stream.test/v"));
    let h = build_with(
        media,
        access,
        RentalConfig {
            orphan_grace_seconds: 0,
            ..Default::default()
        },
    );
    let orphan = AccessToken::new();
    h.access.grant(&orphan, &primary_only()).await.unwrap();

    let first = h.service.recovery().audit().await.unwrap();
    assert_eq!((first.orphaned, first.revoked), (1, 0));
    assert_eq!(h.access.tokens().await.unwrap(), vec![orphan]);

    let second = h.service.recovery().audit().await.unwrap();
    assert_eq!(second.revoked, 1);
    assert!(h.access.tokens().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_access_follows_rental_lifetime() {
    use rewind_storage::providers::SymlinkProvisioner;

    let media = media_dir();
    let root = tempfile::tempdir().unwrap();
    let access = Arc::new(
        SymlinkProvisioner::new(root.path(), media.path(), "https://stream.test/v")
            .await
            .unwrap(),
    );
    let h = build(media, access);
    let film = h.film(standard_year(), all_assets()).await;
    let user = h.user_with(1).await;

    let grant = h.service.request_rental(user, film).await.unwrap();
    let token = grant.rental.access_token.unwrap().to_string();
    assert!(root.path().join(&token).is_dir());
    for url in &grant.streaming_urls {
        let path = h.access.resolve(&token, &url.asset_name).await.unwrap();
        assert!(path.is_file());
    }

    h.service
        .expiry()
        .sweep_at(Utc::now() + Duration::days(4))
        .await
        .unwrap();
    assert!(!root.path().join(&token).exists());
    assert!(
        h.access
            .resolve(&token, "subtitles.vtt")
            .await
            .unwrap_err()
            .is_not_found()
    );
}
