use std::collections::{BTreeMap, VecDeque};

use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Entity, Id};

use super::{ConsumerId, SlotValidator, TimeWindow, WindowError};

/// 提供者ID
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
pub struct ProviderId(String);

impl Id for ProviderId {
    type Inner = String;
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// 枠の予約結果
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reserve {
    /// 予約できた
    Booked,
    /// キャンセル待ちに入った
    Waitlisted,
}

/// 枠の解放結果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Release {
    /// 既に空いていた
    AlreadyOpen,
    /// 空きになった
    Opened,
    /// キャンセル待ちの先頭が繰り上がった
    Promoted(ConsumerId),
}

/// 枠
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    window: TimeWindow,
    open: bool,
    waitlist: VecDeque<ConsumerId>,
}

impl Slot {
    fn new(window: TimeWindow) -> Self {
        Self {
            window,
            open: true,
            waitlist: VecDeque::new(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn waitlist(&self) -> impl Iterator<Item = &ConsumerId> {
        self.waitlist.iter()
    }

    fn reserve(&mut self, consumer: ConsumerId) -> Reserve {
        if self.open {
            self.open = false;
            Reserve::Booked
        } else {
            self.waitlist.push_back(consumer);
            Reserve::Waitlisted
        }
    }

    fn release(&mut self) -> Release {
        if self.open {
            return Release::AlreadyOpen;
        }
        self.open = true;
        match self.waitlist.pop_front() {
            Some(next) => {
                self.reserve(next.clone());
                Release::Promoted(next)
            }
            None => Release::Opened,
        }
    }
}

/// 検証に通らなかった時間帯
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedWindow {
    pub window: String,
    pub error: WindowError,
}

/// 空き枠登録の結果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclareReport {
    pub submitted: usize,
    pub declared: Vec<TimeWindow>,
    pub rejected: Vec<RejectedWindow>,
}

impl DeclareReport {
    pub fn invalid_count(&self) -> usize {
        self.rejected.len()
    }
}

/// 提供者エンティティ
///
/// Owns its slots keyed by window. A slot is never removed once declared,
/// only toggled between open and closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provider {
    id: ProviderId,
    category: String,
    slots: BTreeMap<TimeWindow, Slot>,
}

impl Provider {
    pub fn create(id: ProviderId, category: String) -> Self {
        Self {
            id,
            category,
            slots: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn declare<'a, T: IntoIterator<Item = &'a str>>(
        &mut self,
        validator: &SlotValidator,
        windows: T,
    ) -> DeclareReport {
        let mut report = DeclareReport::default();
        for raw in windows {
            report.submitted += 1;
            match validator.admit(raw) {
                Ok(window) => {
                    self.slots
                        .entry(window)
                        .or_insert_with(|| Slot::new(window));
                    report.declared.push(window);
                }
                Err(error) => report.rejected.push(RejectedWindow {
                    window: raw.to_owned(),
                    error,
                }),
            }
        }
        report
    }

    pub fn is_open(&self, window: &TimeWindow) -> bool {
        self.slots.get(window).map_or(false, Slot::is_open)
    }

    pub fn reserve(
        &mut self,
        window: &TimeWindow,
        consumer: ConsumerId,
    ) -> Result<Reserve, SlotError> {
        Ok(self.slot_mut(window)?.reserve(consumer))
    }

    pub fn release(&mut self, window: &TimeWindow) -> Result<Release, SlotError> {
        Ok(self.slot_mut(window)?.release())
    }

    pub fn slot(&self, window: &TimeWindow) -> Option<&Slot> {
        self.slots.get(window)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn open_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots().filter(|s| s.is_open())
    }

    fn slot_mut(&mut self, window: &TimeWindow) -> Result<&mut Slot, SlotError> {
        self.slots
            .get_mut(window)
            .ok_or(SlotError::SlotNotFound { window: *window })
    }
}

impl Entity for Provider {
    type Id = ProviderId;

    const ENTITY_NAME: &'static str = "provider";

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

/// 枠のエラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// 枠が見つかりません
    #[display(fmt = "No slot declared for {}", window)]
    SlotNotFound { window: TimeWindow },
}
