use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Entity, Id};

use super::{ProviderId, ReservationId, TimeWindow};

/// 利用者ID
#[derive(
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
pub struct ConsumerId(String);

impl Id for ConsumerId {
    type Inner = String;
}

impl From<&str> for ConsumerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AppointmentStatus {
    Booked,
    Waitlisted,
}

/// 利用者から見た予約
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub provider: ProviderId,
    pub window: TimeWindow,
    pub status: AppointmentStatus,
    pub reservation: Option<ReservationId>,
}

/// 利用者エンティティ
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumer {
    id: ConsumerId,
    appointments: Vec<Appointment>,
}

impl Consumer {
    pub fn create(id: ConsumerId) -> Self {
        Self {
            id,
            appointments: Vec::new(),
        }
    }

    pub fn appointments(&self) -> &[Appointment] {
        &self.appointments
    }

    /// The booked appointment holding `window`, with any provider.
    pub fn booked_at(&self, window: &TimeWindow) -> Option<&Appointment> {
        self.appointments
            .iter()
            .find(|a| a.status == AppointmentStatus::Booked && a.window == *window)
    }

    pub(super) fn add_booked(
        &mut self,
        provider: ProviderId,
        window: TimeWindow,
        reservation: ReservationId,
    ) {
        self.appointments.push(Appointment {
            provider,
            window,
            status: AppointmentStatus::Booked,
            reservation: Some(reservation),
        });
    }

    pub(super) fn add_waitlisted(&mut self, provider: ProviderId, window: TimeWindow) {
        self.appointments.push(Appointment {
            provider,
            window,
            status: AppointmentStatus::Waitlisted,
            reservation: None,
        });
    }

    /// Turns the earliest waitlisted appointment for the slot into a booking.
    pub(super) fn promote(
        &mut self,
        provider: &ProviderId,
        window: &TimeWindow,
        reservation: ReservationId,
    ) {
        match self.appointments.iter_mut().find(|a| {
            a.status == AppointmentStatus::Waitlisted
                && a.provider == *provider
                && a.window == *window
        }) {
            Some(appointment) => {
                appointment.status = AppointmentStatus::Booked;
                appointment.reservation = Some(reservation);
            }
            None => self.add_booked(provider.clone(), *window, reservation),
        }
    }

    pub(super) fn remove(&mut self, reservation: ReservationId) {
        self.appointments.retain(|a| a.reservation != Some(reservation));
    }
}

impl Entity for Consumer {
    type Id = ConsumerId;

    const ENTITY_NAME: &'static str = "consumer";

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waitlisted_does_not_count_as_booked() {
        let window: TimeWindow = "09:30-10:00".parse().unwrap();
        let mut consumer = Consumer::create("Y".into());
        consumer.add_waitlisted("Curious".into(), window);
        assert!(consumer.booked_at(&window).is_none());

        consumer.promote(&"Curious".into(), &window, ReservationId::from(2));
        let booked = consumer.booked_at(&window).unwrap();
        assert_eq!(booked.reservation, Some(ReservationId::from(2)));
        assert_eq!(consumer.appointments().len(), 1);

        consumer.remove(ReservationId::from(2));
        assert!(consumer.appointments().is_empty());
    }
}
