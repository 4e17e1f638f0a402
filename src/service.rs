use std::sync::Arc;

use derive_more::{Display, Error};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;

use crate::domain::{
    core::{
        Appointment, Booking, BookingCoordinator, BookingError, BookingEvent, Cancellation,
        ConsumerId, DeclareReport, OpenSlot, ProviderId, Reservation, ReservationId, Slot,
        TimeWindow,
    },
    Aggregation,
};

const CHANNEL_CAPACITY: usize = 100;

type Reply<T> = oneshot::Sender<Result<T, BookingError>>;

enum Command {
    RegisterProvider {
        id: ProviderId,
        category: String,
        reply: Reply<()>,
    },
    DeclareAvailability {
        id: ProviderId,
        windows: Vec<String>,
        reply: Reply<DeclareReport>,
    },
    RegisterConsumer {
        id: ConsumerId,
        reply: Reply<()>,
    },
    Book {
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
        reply: Reply<Booking>,
    },
    Cancel {
        id: ReservationId,
        reply: Reply<Cancellation>,
    },
    ListOpen {
        category: String,
        reply: oneshot::Sender<Vec<OpenSlot>>,
    },
    Appointments {
        consumer: ConsumerId,
        reply: Reply<Vec<Appointment>>,
    },
    Slots {
        provider: ProviderId,
        reply: Reply<Vec<Slot>>,
    },
    Reservations {
        provider: ProviderId,
        reply: Reply<Vec<Reservation>>,
    },
    Events {
        reply: oneshot::Sender<Vec<BookingEvent>>,
    },
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Requester went away before the reply");
    }
}

impl Command {
    fn execute(self, coordinator: &mut BookingCoordinator) {
        match self {
            Command::RegisterProvider {
                id,
                category,
                reply,
            } => respond(reply, coordinator.register_provider(id, category)),
            Command::DeclareAvailability { id, windows, reply } => respond(
                reply,
                coordinator.declare_availability(&id, windows.iter().map(String::as_str)),
            ),
            Command::RegisterConsumer { id, reply } => {
                respond(reply, coordinator.register_consumer(id))
            }
            Command::Book {
                consumer,
                provider,
                window,
                reply,
            } => respond(reply, coordinator.book(&consumer, &provider, &window)),
            Command::Cancel { id, reply } => respond(reply, coordinator.cancel(id)),
            Command::ListOpen { category, reply } => {
                respond(reply, coordinator.list_open(&category))
            }
            Command::Appointments { consumer, reply } => respond(
                reply,
                coordinator
                    .list_appointments(&consumer)
                    .map(|a| a.to_vec()),
            ),
            Command::Slots { provider, reply } => respond(
                reply,
                coordinator
                    .provider(&provider)
                    .map(|p| p.slots().cloned().collect()),
            ),
            Command::Reservations { provider, reply } => respond(
                reply,
                coordinator
                    .provider_reservations(&provider)
                    .map(|r| r.into_iter().cloned().collect()),
            ),
            Command::Events { reply } => respond(reply, coordinator.pop_all()),
        }
    }
}

/// 予約受付をひとつのタスクで動かすハンドル
///
/// Requests are applied one at a time in arrival order, so a cancellation
/// and the promotion it triggers are never interleaved with another request.
#[derive(Clone)]
pub struct CoordinatorTask {
    _handle: Arc<JoinHandle<()>>,
    sender: mpsc::Sender<Command>,
}

impl CoordinatorTask {
    pub fn spawn(mut coordinator: BookingCoordinator) -> Self {
        let (tx_async, mut rx_async) = mpsc::channel::<Command>(CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(command) = rx_async.recv().await {
                command.execute(&mut coordinator);
            }
            debug!("Coordinator task stopped");
        });
        Self {
            _handle: Arc::new(handle),
            sender: tx_async,
        }
    }

    pub async fn register_provider(
        &self,
        id: ProviderId,
        category: String,
    ) -> Result<(), ServiceError> {
        Ok(self
            .request(|reply| Command::RegisterProvider {
                id,
                category,
                reply,
            })
            .await??)
    }

    pub async fn declare_availability(
        &self,
        id: ProviderId,
        windows: Vec<String>,
    ) -> Result<DeclareReport, ServiceError> {
        Ok(self
            .request(|reply| Command::DeclareAvailability { id, windows, reply })
            .await??)
    }

    pub async fn register_consumer(&self, id: ConsumerId) -> Result<(), ServiceError> {
        Ok(self
            .request(|reply| Command::RegisterConsumer { id, reply })
            .await??)
    }

    pub async fn book(
        &self,
        consumer: ConsumerId,
        provider: ProviderId,
        window: TimeWindow,
    ) -> Result<Booking, ServiceError> {
        Ok(self
            .request(|reply| Command::Book {
                consumer,
                provider,
                window,
                reply,
            })
            .await??)
    }

    pub async fn cancel(&self, id: ReservationId) -> Result<Cancellation, ServiceError> {
        Ok(self.request(|reply| Command::Cancel { id, reply }).await??)
    }

    pub async fn list_open(&self, category: String) -> Result<Vec<OpenSlot>, ServiceError> {
        self.request(|reply| Command::ListOpen { category, reply })
            .await
    }

    pub async fn list_appointments(
        &self,
        consumer: ConsumerId,
    ) -> Result<Vec<Appointment>, ServiceError> {
        Ok(self
            .request(|reply| Command::Appointments { consumer, reply })
            .await??)
    }

    pub async fn provider_slots(&self, provider: ProviderId) -> Result<Vec<Slot>, ServiceError> {
        Ok(self
            .request(|reply| Command::Slots { provider, reply })
            .await??)
    }

    pub async fn provider_reservations(
        &self,
        provider: ProviderId,
    ) -> Result<Vec<Reservation>, ServiceError> {
        Ok(self
            .request(|reply| Command::Reservations { provider, reply })
            .await??)
    }

    /// Drains the events recorded since the last call.
    pub async fn events(&self) -> Result<Vec<BookingEvent>, ServiceError> {
        self.request(|reply| Command::Events { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel::<T>();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }
}

#[derive(Error, Display, Debug)]
pub enum ServiceError {
    #[display(fmt = "Coordinator task is not running")]
    Closed,
    #[display(fmt = "{}", _0)]
    Booking(#[error(source)] BookingError),
}

impl From<BookingError> for ServiceError {
    fn from(value: BookingError) -> Self {
        Self::Booking(value)
    }
}
