use std::collections::BTreeMap;

use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Entity, Id};

use super::{ConsumerId, ProviderId, TimeWindow};

/// 予約ID
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
)]
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

/// 予約エンティティ
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    consumer: ConsumerId,
    provider: ProviderId,
    window: TimeWindow,
}

impl Reservation {
    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reservation";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 予約台帳
///
/// Ids start at 1 and are handed out in creation order; a cancelled id is
/// never handed out again.
#[derive(Clone, Debug)]
pub struct ReservationLedger {
    next: u64,
    reservations: BTreeMap<ReservationId, Reservation>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self {
            next: 1,
            reservations: BTreeMap::new(),
        }
    }

    pub fn record(
        &mut self,
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    ) -> ReservationId {
        let id = ReservationId(self.next);
        self.next += 1;
        self.reservations.insert(
            id,
            Reservation {
                id,
                consumer,
                provider,
                window,
            },
        );
        id
    }

    pub fn lookup(&self, id: ReservationId) -> Result<&Reservation, LedgerError> {
        self.reservations
            .get(&id)
            .ok_or(LedgerError::ReservationNotFound { id })
    }

    pub fn remove(&mut self, id: ReservationId) -> Result<Reservation, LedgerError> {
        self.reservations
            .remove(&id)
            .ok_or(LedgerError::ReservationNotFound { id })
    }

    pub fn for_provider(&self, provider: &ProviderId) -> impl Iterator<Item = &Reservation> + '_ {
        let provider = provider.clone();
        self.reservations
            .values()
            .filter(move |r| r.provider == provider)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// 予約台帳のエラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// 予約が見つかりません
    #[display(fmt = "Reservation {} not found", id)]
    ReservationNotFound { id: ReservationId },
}
