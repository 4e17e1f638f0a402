use std::collections::{hash_map::Entry, HashMap};

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Aggregation, Entity, Event, EventQueue};

use super::{
    Appointment, AppointmentStatus, AvailabilityRanker, Consumer, ConsumerId, DeclareReport,
    LedgerError, OpenSlot, Provider, ProviderId, Release, Reservation, ReservationId,
    ReservationLedger, Reserve, SlotError, SlotValidator, TimeWindow,
};

/// 予約イベント
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    /// 提供者が登録された
    ProviderRegistered {
        provider: ProviderId,
        category: String,
    },
    /// 空き枠が登録された
    AvailabilityDeclared {
        provider: ProviderId,
        declared: Vec<TimeWindow>,
        rejected: usize,
    },
    /// 利用者が登録された
    ConsumerRegistered { consumer: ConsumerId },
    /// 予約された
    Booked {
        id: ReservationId,
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    },
    /// キャンセル待ちに入った
    Waitlisted {
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    },
    /// 予約が取り消された
    Cancelled {
        id: ReservationId,
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    },
    /// キャンセル待ちから繰り上がった
    Promoted {
        id: ReservationId,
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    },
    /// 取り消した枠は既に空いていた
    AlreadyOpen {
        provider: ProviderId,
        window: TimeWindow,
    },
}

impl Event for BookingEvent {}

/// 予約の結果
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Booking {
    Booked(ReservationId),
    Waitlisted,
}

impl Booking {
    pub fn status(&self) -> AppointmentStatus {
        match self {
            Booking::Booked(_) => AppointmentStatus::Booked,
            Booking::Waitlisted => AppointmentStatus::Waitlisted,
        }
    }

    pub fn reservation(&self) -> Option<ReservationId> {
        match self {
            Booking::Booked(id) => Some(*id),
            Booking::Waitlisted => None,
        }
    }
}

/// 繰り上がり
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub consumer: ConsumerId,
    pub reservation: ReservationId,
}

/// 取り消しの結果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled: Reservation,
    pub already_open: bool,
    pub promotion: Option<Promotion>,
}

/// 予約の受付
///
/// Owns the provider and consumer directories and the reservation ledger.
/// Every state change is recorded as a [`BookingEvent`].
#[derive(Clone, Debug, Default)]
pub struct BookingCoordinator {
    validator: SlotValidator,
    ranker: AvailabilityRanker,
    providers: HashMap<ProviderId, Provider>,
    consumers: HashMap<ConsumerId, Consumer>,
    ledger: ReservationLedger,
    events: EventQueue<BookingEvent>,
}

impl BookingCoordinator {
    pub fn new(validator: SlotValidator, ranker: AvailabilityRanker) -> Self {
        Self {
            validator,
            ranker,
            ..Default::default()
        }
    }

    pub fn register_provider(
        &mut self,
        id: ProviderId,
        category: String,
    ) -> Result<(), BookingError> {
        match self.providers.entry(id.clone()) {
            Entry::Occupied(_) => Err(BookingError::ProviderAlreadyRegistered { provider: id }),
            Entry::Vacant(entry) => {
                entry.insert(Provider::create(id.clone(), category.clone()));
                info!("Registered {} {} ({})", Provider::ENTITY_NAME, id, category);
                self.events.push(BookingEvent::ProviderRegistered {
                    provider: id,
                    category,
                });
                Ok(())
            }
        }
    }

    pub fn declare_availability<'a, T: IntoIterator<Item = &'a str>>(
        &mut self,
        id: &ProviderId,
        windows: T,
    ) -> Result<DeclareReport, BookingError> {
        let provider = self
            .providers
            .get_mut(id)
            .ok_or_else(|| BookingError::ProviderNotFound { provider: id.clone() })?;
        let report = provider.declare(&self.validator, windows);
        for rejected in &report.rejected {
            warn!("Rejected window {} for {}: {}", rejected.window, id, rejected.error);
        }
        info!(
            "Declared {} of {} windows for {}",
            report.declared.len(),
            report.submitted,
            id
        );
        self.events.push(BookingEvent::AvailabilityDeclared {
            provider: id.clone(),
            declared: report.declared.clone(),
            rejected: report.invalid_count(),
        });
        Ok(report)
    }

    pub fn register_consumer(&mut self, id: ConsumerId) -> Result<(), BookingError> {
        match self.consumers.entry(id.clone()) {
            Entry::Occupied(_) => Err(BookingError::ConsumerAlreadyRegistered { consumer: id }),
            Entry::Vacant(entry) => {
                entry.insert(Consumer::create(id.clone()));
                info!("Registered {} {}", Consumer::ENTITY_NAME, id);
                self.events
                    .push(BookingEvent::ConsumerRegistered { consumer: id });
                Ok(())
            }
        }
    }

    pub fn book(
        &mut self,
        consumer: &ConsumerId,
        provider: &ProviderId,
        window: &TimeWindow,
    ) -> Result<Booking, BookingError> {
        if let Some(held) = self
            .consumers
            .get(consumer)
            .and_then(|c| c.booked_at(window))
        {
            return Err(BookingError::DuplicateConflict {
                consumer: consumer.clone(),
                window: *window,
                held_with: held.provider.clone(),
            });
        }
        let holder = self
            .consumers
            .get_mut(consumer)
            .ok_or_else(|| BookingError::ConsumerNotFound {
                consumer: consumer.clone(),
            })?;
        let slots = self
            .providers
            .get_mut(provider)
            .ok_or_else(|| BookingError::ProviderNotFound {
                provider: provider.clone(),
            })?;
        let reserved = slots
            .reserve(window, consumer.clone())
            .map_err(|e| BookingError::from_slot(provider, e))?;
        match reserved {
            Reserve::Booked => {
                let id = self
                    .ledger
                    .record(consumer.clone(), provider.clone(), *window);
                holder.add_booked(provider.clone(), *window, id);
                info!("Booked {} with {} at {} as #{}", consumer, provider, window, id);
                self.events.push(BookingEvent::Booked {
                    id,
                    consumer: consumer.clone(),
                    provider: provider.clone(),
                    window: *window,
                });
                Ok(Booking::Booked(id))
            }
            Reserve::Waitlisted => {
                holder.add_waitlisted(provider.clone(), *window);
                debug!("Waitlisted {} with {} at {}", consumer, provider, window);
                self.events.push(BookingEvent::Waitlisted {
                    consumer: consumer.clone(),
                    provider: provider.clone(),
                    window: *window,
                });
                Ok(Booking::Waitlisted)
            }
        }
    }

    pub fn cancel(&mut self, id: ReservationId) -> Result<Cancellation, BookingError> {
        let reservation = self.ledger.lookup(id)?.clone();
        let provider_id = reservation.provider().clone();
        let window = reservation.window();
        let provider = self
            .providers
            .get_mut(&provider_id)
            .ok_or_else(|| BookingError::ProviderNotFound {
                provider: provider_id.clone(),
            })?;
        let released = provider
            .release(&window)
            .map_err(|e| BookingError::from_slot(&provider_id, e))?;
        self.ledger.remove(id)?;
        if let Some(consumer) = self.consumers.get_mut(reservation.consumer()) {
            consumer.remove(id);
        }
        info!(
            "Cancelled #{} of {} with {} at {}",
            id,
            reservation.consumer(),
            provider_id,
            window
        );
        self.events.push(BookingEvent::Cancelled {
            id,
            consumer: reservation.consumer().clone(),
            provider: provider_id.clone(),
            window,
        });

        let mut cancellation = Cancellation {
            cancelled: reservation,
            already_open: false,
            promotion: None,
        };
        match released {
            // A recorded reservation always holds its slot closed, so this
            // only shows up if the ledger and the slots disagree.
            Release::AlreadyOpen => {
                info!("Slot {} of {} was already open", window, provider_id);
                self.events.push(BookingEvent::AlreadyOpen {
                    provider: provider_id,
                    window,
                });
                cancellation.already_open = true;
            }
            Release::Opened => {}
            Release::Promoted(next) => {
                let promoted = self.ledger.record(next.clone(), provider_id.clone(), window);
                if let Some(consumer) = self.consumers.get_mut(&next) {
                    consumer.promote(&provider_id, &window, promoted);
                }
                info!(
                    "Promoted {} from the waitlist of {} at {} as #{}",
                    next, provider_id, window, promoted
                );
                self.events.push(BookingEvent::Promoted {
                    id: promoted,
                    consumer: next.clone(),
                    provider: provider_id,
                    window,
                });
                cancellation.promotion = Some(Promotion {
                    consumer: next,
                    reservation: promoted,
                });
            }
        }
        Ok(cancellation)
    }

    pub fn list_open(&self, category: &str) -> Vec<OpenSlot> {
        self.ranker.list_open_slots(self.providers.values(), category)
    }

    pub fn list_appointments(
        &self,
        consumer: &ConsumerId,
    ) -> Result<&[Appointment], BookingError> {
        Ok(self.consumer(consumer)?.appointments())
    }

    pub fn provider_reservations(
        &self,
        provider: &ProviderId,
    ) -> Result<Vec<&Reservation>, BookingError> {
        self.provider(provider)?;
        Ok(self.ledger.for_provider(provider).collect())
    }

    pub fn provider(&self, id: &ProviderId) -> Result<&Provider, BookingError> {
        self.providers
            .get(id)
            .ok_or_else(|| BookingError::ProviderNotFound { provider: id.clone() })
    }

    pub fn consumer(&self, id: &ConsumerId) -> Result<&Consumer, BookingError> {
        self.consumers
            .get(id)
            .ok_or_else(|| BookingError::ConsumerNotFound { consumer: id.clone() })
    }

    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }
}

impl Aggregation for BookingCoordinator {
    type Event = BookingEvent;

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

/// 予約受付のエラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// 提供者が見つかりません
    #[display(fmt = "Provider {} not found", provider)]
    ProviderNotFound { provider: ProviderId },
    /// 利用者が見つかりません
    #[display(fmt = "Consumer {} not found", consumer)]
    ConsumerNotFound { consumer: ConsumerId },
    /// 提供者にその枠がありません
    #[display(fmt = "Provider {} has no slot at {}", provider, window)]
    SlotNotFound {
        provider: ProviderId,
        window: TimeWindow,
    },
    /// 予約が見つかりません
    #[display(fmt = "Reservation {} not found", id)]
    ReservationNotFound { id: ReservationId },
    /// 同じ時間帯に既に予約があります
    #[display(
        fmt = "{} already has an appointment at {} with {}",
        consumer,
        window,
        held_with
    )]
    DuplicateConflict {
        consumer: ConsumerId,
        window: TimeWindow,
        held_with: ProviderId,
    },
    /// 提供者は登録済みです
    #[display(fmt = "Provider {} is already registered", provider)]
    ProviderAlreadyRegistered { provider: ProviderId },
    /// 利用者は登録済みです
    #[display(fmt = "Consumer {} is already registered", consumer)]
    ConsumerAlreadyRegistered { consumer: ConsumerId },
}

impl BookingError {
    fn from_slot(provider: &ProviderId, error: SlotError) -> Self {
        match error {
            SlotError::SlotNotFound { window } => BookingError::SlotNotFound {
                provider: provider.clone(),
                window,
            },
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ReservationNotFound { id } => BookingError::ReservationNotFound { id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(s: &str) -> TimeWindow {
        s.parse().unwrap()
    }

    fn coordinator() -> BookingCoordinator {
        let mut coordinator = BookingCoordinator::default();
        coordinator
            .register_provider("P".into(), "Cardio".to_owned())
            .unwrap();
        coordinator
            .declare_availability(&"P".into(), ["09:30-10:00"])
            .unwrap();
        coordinator.register_consumer("X".into()).unwrap();
        coordinator.register_consumer("Y".into()).unwrap();
        coordinator.clear();
        coordinator
    }

    #[test]
    fn test_book_waitlist_cancel_promote() {
        let mut coordinator = coordinator();
        let (p, x, y) = (ProviderId::from("P"), ConsumerId::from("X"), ConsumerId::from("Y"));
        let w = window("09:30-10:00");

        let first = coordinator.book(&x, &p, &w).unwrap();
        assert_eq!(first, Booking::Booked(ReservationId::from(1)));
        let second = coordinator.book(&y, &p, &w).unwrap();
        assert_eq!(second, Booking::Waitlisted);
        assert_eq!(second.reservation(), None);
        assert_eq!(
            coordinator.list_appointments(&y).unwrap()[0].status,
            AppointmentStatus::Waitlisted
        );

        let cancellation = coordinator.cancel(ReservationId::from(1)).unwrap();
        assert_eq!(
            cancellation.promotion,
            Some(Promotion {
                consumer: y.clone(),
                reservation: ReservationId::from(2),
            })
        );
        assert!(!cancellation.already_open);
        assert!(!coordinator.provider(&p).unwrap().is_open(&w));
        assert!(coordinator.list_appointments(&x).unwrap().is_empty());

        let appointments = coordinator.list_appointments(&y).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].status, AppointmentStatus::Booked);
        assert_eq!(appointments[0].reservation, Some(ReservationId::from(2)));
        let promoted = coordinator.ledger().lookup(ReservationId::from(2)).unwrap();
        assert_eq!(promoted.consumer(), &y);
        assert!(coordinator.ledger().lookup(ReservationId::from(1)).is_err());
    }

    #[test]
    fn test_duplicate_conflict_across_providers() {
        let mut coordinator = coordinator();
        coordinator
            .register_provider("P2".into(), "Derm".to_owned())
            .unwrap();
        coordinator
            .declare_availability(&"P2".into(), ["09:30-10:00"])
            .unwrap();
        let x = ConsumerId::from("X");
        let w = window("09:30-10:00");
        coordinator.book(&x, &"P".into(), &w).unwrap();
        coordinator.clear();

        let err = coordinator.book(&x, &"P2".into(), &w).unwrap_err();
        assert_eq!(
            err,
            BookingError::DuplicateConflict {
                consumer: x.clone(),
                window: w,
                held_with: "P".into(),
            }
        );
        assert!(coordinator.provider(&"P2".into()).unwrap().is_open(&w));
        assert_eq!(coordinator.list_appointments(&x).unwrap().len(), 1);
        assert_eq!(coordinator.ledger().len(), 1);
        assert!(coordinator.peek().is_none());
    }

    #[test]
    fn test_waitlisted_attempt_is_not_a_conflict() {
        let mut coordinator = coordinator();
        coordinator
            .register_provider("P2".into(), "Cardio".to_owned())
            .unwrap();
        coordinator
            .declare_availability(&"P2".into(), ["09:30-10:00"])
            .unwrap();
        let w = window("09:30-10:00");
        coordinator.book(&"X".into(), &"P".into(), &w).unwrap();
        assert_eq!(
            coordinator.book(&"Y".into(), &"P".into(), &w).unwrap(),
            Booking::Waitlisted
        );
        assert_eq!(
            coordinator.book(&"Y".into(), &"P2".into(), &w).unwrap(),
            Booking::Booked(ReservationId::from(2))
        );
    }

    #[test]
    fn test_same_slot_booked_once() {
        let mut coordinator = coordinator();
        let w = window("09:30-10:00");
        let outcomes = [
            coordinator.book(&"X".into(), &"P".into(), &w).unwrap(),
            coordinator.book(&"Y".into(), &"P".into(), &w).unwrap(),
        ];
        assert_eq!(
            outcomes
                .iter()
                .filter(|b| b.status() == AppointmentStatus::Booked)
                .count(),
            1
        );
        assert_eq!(coordinator.provider_reservations(&"P".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_provider_reservations_lists_only_that_provider() {
        let mut coordinator = coordinator();
        coordinator
            .register_provider("P2".into(), "Derm".to_owned())
            .unwrap();
        coordinator
            .declare_availability(&"P2".into(), ["12:30-13:00"])
            .unwrap();
        coordinator
            .book(&"X".into(), &"P".into(), &window("09:30-10:00"))
            .unwrap();
        coordinator
            .book(&"Y".into(), &"P2".into(), &window("12:30-13:00"))
            .unwrap();
        let reservations = coordinator.provider_reservations(&"P2".into()).unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].consumer(), &ConsumerId::from("Y"));
        assert!(coordinator.provider_reservations(&"Q".into()).is_err());
    }

    #[test]
    fn test_not_found() {
        let mut coordinator = coordinator();
        let w = window("09:30-10:00");
        assert_eq!(
            coordinator.book(&"Z".into(), &"P".into(), &w),
            Err(BookingError::ConsumerNotFound { consumer: "Z".into() })
        );
        assert_eq!(
            coordinator.book(&"X".into(), &"Q".into(), &w),
            Err(BookingError::ProviderNotFound { provider: "Q".into() })
        );
        assert_eq!(
            coordinator.book(&"X".into(), &"P".into(), &window("12:30-13:00")),
            Err(BookingError::SlotNotFound {
                provider: "P".into(),
                window: window("12:30-13:00"),
            })
        );
        assert_eq!(
            coordinator.cancel(ReservationId::from(7)),
            Err(BookingError::ReservationNotFound { id: ReservationId::from(7) })
        );
        assert!(coordinator.declare_availability(&"Q".into(), ["09:00-09:30"]).is_err());
        assert!(coordinator.list_appointments(&"Z".into()).is_err());
        assert!(coordinator.list_appointments(&"X".into()).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_without_waitlist_reopens() {
        let mut coordinator = coordinator();
        let w = window("09:30-10:00");
        let id = coordinator
            .book(&"X".into(), &"P".into(), &w)
            .unwrap()
            .reservation()
            .unwrap();
        let cancellation = coordinator.cancel(id).unwrap();
        assert_eq!(cancellation.promotion, None);
        assert_eq!(cancellation.cancelled.id(), id);
        assert!(coordinator.provider(&"P".into()).unwrap().is_open(&w));
        assert_eq!(
            coordinator.cancel(id),
            Err(BookingError::ReservationNotFound { id })
        );

        let again = coordinator.book(&"X".into(), &"P".into(), &w).unwrap();
        assert_eq!(again, Booking::Booked(ReservationId::from(2)));
    }

    #[test]
    fn test_promotion_chain_follows_arrival_order() {
        let mut coordinator = coordinator();
        coordinator.register_consumer("Z".into()).unwrap();
        let w = window("09:30-10:00");
        coordinator.book(&"X".into(), &"P".into(), &w).unwrap();
        coordinator.book(&"Z".into(), &"P".into(), &w).unwrap();
        coordinator.book(&"Y".into(), &"P".into(), &w).unwrap();

        let first = coordinator.cancel(ReservationId::from(1)).unwrap();
        let promoted = first.promotion.unwrap();
        assert_eq!(promoted.consumer, ConsumerId::from("Z"));

        let second = coordinator.cancel(promoted.reservation).unwrap();
        assert_eq!(
            second.promotion,
            Some(Promotion {
                consumer: "Y".into(),
                reservation: ReservationId::from(3),
            })
        );
        assert!(coordinator.list_appointments(&"Z".into()).unwrap().is_empty());
    }

    #[test]
    fn test_events_record_cancellation_and_promotion() {
        let mut coordinator = coordinator();
        let w = window("09:30-10:00");
        coordinator.book(&"X".into(), &"P".into(), &w).unwrap();
        coordinator.book(&"Y".into(), &"P".into(), &w).unwrap();
        coordinator.cancel(ReservationId::from(1)).unwrap();
        let events = coordinator.pop_all();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[1], BookingEvent::Waitlisted { .. }));
        assert!(matches!(events[2], BookingEvent::Cancelled { .. }));
        assert_eq!(
            events[3],
            BookingEvent::Promoted {
                id: ReservationId::from(2),
                consumer: "Y".into(),
                provider: "P".into(),
                window: w,
            }
        );
        assert!(coordinator.peek().is_none());
    }

    #[test]
    fn test_register_twice_keeps_first() {
        let mut coordinator = coordinator();
        assert_eq!(
            coordinator.register_provider("P".into(), "Derm".to_owned()),
            Err(BookingError::ProviderAlreadyRegistered { provider: "P".into() })
        );
        assert_eq!(coordinator.provider(&"P".into()).unwrap().category(), "Cardio");
        assert!(coordinator.register_consumer("X".into()).is_err());
    }

    #[test]
    fn test_declare_reports_invalid_windows() {
        let mut coordinator = coordinator();
        let report = coordinator
            .declare_availability(&"P".into(), ["09:30-10:30", "12:30-13:00", "16:00-16:30"])
            .unwrap();
        assert_eq!(report.invalid_count(), 1);
        assert_eq!(report.submitted, 3);
        assert_eq!(coordinator.list_open("Cardio").len(), 3);
        assert!(coordinator.list_open("Derm").is_empty());
    }
}
