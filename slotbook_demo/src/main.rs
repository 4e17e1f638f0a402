use std::error::Error;

use slotbook::{
    domain::core::{AvailabilityRanker, Booking, BookingCoordinator, ReservationId, TimeWindow},
    service::{CoordinatorTask, ServiceError},
    SlotbookConfig,
};
use tracing::{debug, error, info, warn, Level};

#[tokio::main]
async fn main() {
    match SlotbookConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = run(&config).await {
                error!("Application error: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("Application error: {}", error)
        }
    }
}

/// Logs a refused request and lets the scenario carry on.
fn refused<T>(result: Result<T, ServiceError>) -> Result<Option<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ServiceError::Booking(e)) => {
            warn!("Request refused: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn run(config: &SlotbookConfig) -> Result<(), Box<dyn Error>> {
    let task = CoordinatorTask::spawn(BookingCoordinator::new(
        config.validator(),
        AvailabilityRanker::new(config.listing.ranking),
    ));

    task.register_provider("Curious".into(), "Cardiologist".to_owned())
        .await?;
    let report = task
        .declare_availability("Curious".into(), vec!["09:30-10:30".to_owned()])
        .await?;
    info!(
        "{} invalid slots out of {} for Curious",
        report.invalid_count(),
        report.submitted
    );
    declare(&task, "Curious", &["09:30-10:00", "12:30-13:00", "16:00-16:30"]).await?;
    task.register_provider("Dreadful".into(), "Dermatologist".to_owned())
        .await?;
    declare(&task, "Dreadful", &["9:30-10:00", "12:30-13:00", "16:00-16:30"]).await?;
    show_open(&task, "Cardiologist").await?;

    let noon: TimeWindow = "12:30-13:00".parse()?;
    task.register_consumer("PatientA".into()).await?;
    let first = refused(task.book("PatientA".into(), "Curious".into(), noon).await)?;
    refused(task.book("PatientA".into(), "Dreadful".into(), noon).await)?;

    task.register_consumer("PatientC".into()).await?;
    refused(task.book("PatientC".into(), "Curious".into(), noon).await)?;
    show_open(&task, "Cardiologist").await?;

    if let Some(Booking::Booked(id)) = first {
        cancel(&task, id).await?;
    }
    show_open(&task, "Cardiologist").await?;

    task.register_consumer("PatientB".into()).await?;
    refused(task.book("PatientB".into(), "Curious".into(), noon).await)?;

    task.register_provider("Daring".into(), "Dermatologist".to_owned())
        .await?;
    declare(&task, "Daring", &["11:30-12:00", "14:00-14:30"]).await?;
    show_open(&task, "Dermatologist").await?;

    for patient in ["PatientA", "PatientB", "PatientC"] {
        let appointments = task.list_appointments(patient.into()).await?;
        info!("{}: {}", patient, serde_json::to_string(&appointments)?);
    }
    for slot in task.provider_slots("Curious".into()).await? {
        info!(
            "Curious {}: {}",
            slot.window(),
            if slot.is_open() { "Available" } else { "Not Available" }
        );
    }
    let reservations = task.provider_reservations("Curious".into()).await?;
    info!("Curious holds {} reservations", reservations.len());

    for event in task.events().await? {
        debug!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn declare(
    task: &CoordinatorTask,
    provider: &str,
    windows: &[&str],
) -> Result<(), ServiceError> {
    let report = task
        .declare_availability(
            provider.into(),
            windows.iter().map(|w| w.to_string()).collect(),
        )
        .await?;
    if report.invalid_count() > 0 {
        warn!(
            "{} invalid slots out of {} for {}",
            report.invalid_count(),
            report.submitted,
            provider
        );
    }
    Ok(())
}

async fn show_open(task: &CoordinatorTask, category: &str) -> Result<(), Box<dyn Error>> {
    let slots = task.list_open(category.to_owned()).await?;
    info!("Open {} slots: {}", category, serde_json::to_string(&slots)?);
    Ok(())
}

async fn cancel(task: &CoordinatorTask, id: ReservationId) -> Result<(), ServiceError> {
    let cancellation = task.cancel(id).await?;
    match cancellation.promotion {
        Some(promotion) => info!(
            "Reservation {} cancelled, {} promoted as {}",
            id, promotion.consumer, promotion.reservation
        ),
        None => info!("Reservation {} cancelled", id),
    }
    Ok(())
}
