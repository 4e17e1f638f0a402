use serde::{Deserialize, Serialize};

use crate::domain::Entity;

use super::{Provider, ProviderId, TimeWindow};

/// 空き枠の並び順
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingMode {
    /// 開始時刻順、同時刻は提供者ID順
    #[default]
    StartTime,
    /// 提供者ID順、同じ提供者内は開始時刻順
    Provider,
}

/// 空き枠
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSlot {
    pub provider: ProviderId,
    pub window: TimeWindow,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AvailabilityRanker {
    mode: RankingMode,
}

impl AvailabilityRanker {
    pub fn new(mode: RankingMode) -> Self {
        Self { mode }
    }

    pub fn list_open_slots<'a, T>(&self, providers: T, category: &str) -> Vec<OpenSlot>
    where
        T: IntoIterator<Item = &'a Provider>,
    {
        let mut slots = providers
            .into_iter()
            .filter(|p| p.category() == category)
            .flat_map(|p| {
                p.open_slots().map(move |s| OpenSlot {
                    provider: p.id(),
                    window: s.window(),
                })
            })
            .collect::<Vec<_>>();
        match self.mode {
            RankingMode::StartTime => {
                slots.sort_by(|a, b| (a.window, &a.provider).cmp(&(b.window, &b.provider)))
            }
            RankingMode::Provider => {
                slots.sort_by(|a, b| (&a.provider, a.window).cmp(&(&b.provider, b.window)))
            }
        }
        slots
    }
}
