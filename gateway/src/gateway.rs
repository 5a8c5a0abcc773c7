//! The gateway orchestrator: one inbound operation becomes one or more
//! backend calls plus cache maintenance.
use crate::backends::{DATA_SERVICE, DataService, PAYMENT_SERVICE, PaymentService, WriteAck};
use crate::cache::{self, CacheKey, CacheStore};
use crate::config::{Config, PaymentDefaults};
use crate::errors::{GatewayError, Result};
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS, SAGA_PARTIAL_FAILURES, UPSTREAM_FAILURES};
use crate::types::{
    DueToRecord, NewDueTo, NewPayment, NewUser, UpdatePayload, UserData,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;

/// Stateless request orchestrator over the data service, the payment
/// service, and the shared cache store. Reads are cache-aside; writes
/// invalidate the written entity's key whenever the HTTP exchange with the
/// backend completed, even if the backend reported a logical failure, since
/// the attempted write may have superseded whatever the cache holds.
///
/// Two non-guarantees worth knowing about:
/// - Reads and writes for the same entity are not ordered against each
///   other. A read racing a write may observe either the pre- or the
///   post-write cached value.
/// - A transport failure on a write does not prove the backend did not
///   apply it; the response may simply have been lost. In that case the
///   cache keeps the pre-write entry until the next successful write or
///   read-miss overwrites it.
#[derive(Clone)]
pub struct Gateway {
    data: DataService,
    payments: PaymentService,
    cache: Arc<dyn CacheStore>,
    payment_defaults: PaymentDefaults,
}

impl Gateway {
    /// The clients and the cache store are built once at startup and
    /// injected; the orchestrator holds no other state.
    pub fn new(config: &Config, cache: Arc<dyn CacheStore>) -> Self {
        Gateway {
            data: DataService::new(&config.data_service, &config.timeouts),
            payments: PaymentService::new(&config.payment_service, &config.timeouts),
            cache,
            payment_defaults: config.payment_defaults.clone(),
        }
    }

    // ----- reads -----

    pub async fn user(&self, user_id: i64) -> Result<Option<UserData>> {
        let key = CacheKey::User(user_id);
        if let Some(user) = self.serve_cached(key).await {
            return Ok(Some(user));
        }

        let Some(user) = self.data.fetch_user(user_id).await? else {
            return Ok(None);
        };
        self.populate(key, &user).await;
        Ok(Some(user))
    }

    /// Serves a single user field, from the cached full entity when one is
    /// present. A refined fetch returns a subset of the entity and must not
    /// seed the full-entity hash, so misses are not populated here.
    pub async fn user_field(
        &self,
        user_id: i64,
        target_field: &str,
    ) -> Result<Option<serde_json::Value>> {
        if let Some(fields) = self.cached_fields(CacheKey::User(user_id)).await
            && let Some(raw) = fields.get(target_field)
            && let Ok(value) = serde_json::from_str(raw)
        {
            counter!(CACHE_HIT).increment(1);
            return Ok(Some(value));
        }

        counter!(CACHE_MISS).increment(1);
        self.data.fetch_user_field(user_id, target_field).await
    }

    pub async fn due_to(&self, user_id: i64) -> Result<DueToRecord> {
        let key = CacheKey::DueTo(user_id);
        if let Some(record) = self.serve_cached(key).await {
            return Ok(record);
        }

        let Some(record) = self.payments.due_to(user_id).await? else {
            // The user has no due dates; nothing to cache
            return Ok(DueToRecord::default());
        };
        if !record.is_empty() {
            self.populate(key, &record).await;
        }
        Ok(record)
    }

    /// Cheap boolean lookup, not worth caching.
    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        self.data.user_exists(user_id).await
    }

    /// Cheap boolean lookup, not worth caching.
    pub async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        self.data.nickname_exists(nickname).await
    }

    pub async fn payment_link(&self, user_id: i64) -> Result<Option<String>> {
        self.payments.payment_link(user_id).await
    }

    /// Connectivity probe against the data service.
    pub async fn health(&self) -> Result<()> {
        self.data.health().await
    }

    // ----- writes -----

    /// Two-step saga with no rollback: commit the user at the data service,
    /// then open the default payment record. The payment service is never
    /// called unless the user step succeeded. A payment failure after the
    /// user committed surfaces as [`GatewayError::PaymentSetupFailed`] so
    /// the caller can retry just that step.
    pub async fn create_user(&self, user: &NewUser) -> Result<()> {
        let user_id = user.user_id;

        let ack = self.data.post_user(user).await?;
        self.settle_write("create_user", DATA_SERVICE, CacheKey::User(user_id), ack)
            .await?;

        let payment = NewPayment::from_defaults(user_id, &self.payment_defaults);
        let payment_result = match self.payments.add_payment(&payment).await {
            Ok(ack) => {
                self.settle_write("create_user", PAYMENT_SERVICE, CacheKey::DueTo(user_id), ack)
                    .await
            }
            Err(e) => Err(e),
        };

        payment_result.map_err(|source| {
            counter!(SAGA_PARTIAL_FAILURES).increment(1);
            tracing::error!(
                operation = "create_user",
                user_id,
                error = %source,
                "user created but default payment was not"
            );
            GatewayError::PaymentSetupFailed {
                user_id,
                source: Box::new(source),
            }
        })
    }

    pub async fn create_payment(&self, payment: &NewPayment) -> Result<()> {
        let ack = self.payments.add_payment(payment).await?;
        self.settle_write(
            "create_payment",
            PAYMENT_SERVICE,
            CacheKey::DueTo(payment.user_id),
            ack,
        )
        .await
    }

    /// Routes the polymorphic update to the matching backend path and
    /// invalidates the matching namespace. User and profile entries for the
    /// same id are distinct; only the updated kind is invalidated.
    pub async fn update(&self, payload: &UpdatePayload) -> Result<()> {
        match payload {
            UpdatePayload::User(user) => {
                let ack = self.data.post_user(user).await?;
                self.settle_write("update", DATA_SERVICE, CacheKey::User(user.user_id), ack)
                    .await
            }
            UpdatePayload::Profile(profile) => {
                let ack = self.data.post_profile(profile).await?;
                self.settle_write(
                    "update",
                    DATA_SERVICE,
                    CacheKey::Profile(profile.user_id),
                    ack,
                )
                .await
            }
        }
    }

    pub async fn set_due_to(&self, due_to: &NewDueTo) -> Result<()> {
        let ack = self.payments.post_due_to(due_to).await?;
        self.settle_write(
            "set_due_to",
            PAYMENT_SERVICE,
            CacheKey::DueTo(due_to.user_id),
            ack,
        )
        .await
    }

    // ----- cache plumbing -----

    /// Best-effort read of the raw hash; a failing store degrades to a miss
    /// so reads fall through to the backend.
    async fn cached_fields(&self, key: CacheKey) -> Option<HashMap<String, String>> {
        match self.cache.read_hash(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, falling through to backend");
                None
            }
        }
    }

    async fn serve_cached<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let Some(fields) = self.cached_fields(key).await else {
            counter!(CACHE_MISS).increment(1);
            return None;
        };

        match cache::decode_fields(fields) {
            Ok(value) => {
                counter!(CACHE_HIT).increment(1);
                Some(value)
            }
            Err(e) => {
                // Treated as a miss; the entry is overwritten on the way back
                counter!(CACHE_MISS).increment(1);
                tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Best-effort population; a failed write leaves the entry absent until
    /// the next read repopulates it.
    async fn populate<T: Serialize>(&self, key: CacheKey, value: &T) {
        let fields = match cache::encode_fields(value) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache encode failed");
                return;
            }
        };
        if let Err(e) = self.cache.write_hash(key, &fields).await {
            tracing::warn!(key = %key, error = %e, "cache population failed");
        }
    }

    /// Best-effort invalidation. A failed delete leaves the entry stale
    /// until the next successful write or natural overwrite.
    async fn invalidate(&self, key: CacheKey) {
        if let Err(e) = self.cache.invalidate(key).await {
            tracing::warn!(key = %key, error = %e, "cache invalidation failed");
        }
    }

    /// The write contract: a completed exchange invalidates the entity's
    /// key first, then a logical failure is surfaced to the caller.
    async fn settle_write(
        &self,
        operation: &'static str,
        service: &'static str,
        key: CacheKey,
        ack: WriteAck,
    ) -> Result<()> {
        self.invalidate(key).await;

        if ack.is_failure() {
            counter!(UPSTREAM_FAILURES).increment(1);
            tracing::error!(
                operation,
                service,
                key = %key,
                status = %ack.status,
                body = %ack.body,
                "backend rejected write"
            );
            return Err(GatewayError::UpstreamStatus {
                service,
                status: ack.status,
                body: ack.body,
            });
        }

        Ok(())
    }
}
