use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike};
use derive_more::{Display, Error};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// 既定の枠の長さ(分)
pub const SLOT_MINUTES: u16 = 30;

/// 一日の中の時間帯
///
/// Start and end are minutes since midnight. The textual form is
/// `H:MM-H:MM`, hours may be unpadded; it is always displayed zero padded.
/// Windows compare numerically by start, then end.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub struct TimeWindow {
    start: u16,
    end: u16,
}

impl TimeWindow {
    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn duration(&self) -> u16 {
        self.end.saturating_sub(self.start)
    }

    fn parse_time(s: &str) -> Result<u16, WindowError> {
        let (hour, minute) = s.split_once(':').ok_or(WindowError::Malformed)?;
        let digits = |s: &str, max: usize| {
            (1..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(hour, 2) || minute.len() != 2 || !digits(minute, 2) {
            return Err(WindowError::Malformed);
        }
        let hour = hour.parse::<u32>().map_err(|_| WindowError::Malformed)?;
        let minute = minute.parse::<u32>().map_err(|_| WindowError::Malformed)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(WindowError::OutOfRange)?;
        Ok((time.num_seconds_from_midnight() / 60) as u16)
    }
}

impl FromStr for TimeWindow {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once('-').ok_or(WindowError::Malformed)?;
        Ok(Self {
            start: Self::parse_time(start)?,
            end: Self::parse_time(end)?,
        })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

/// 時間帯のエラー
#[derive(Error, Display, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// `H:MM-H:MM` の形式ではありません
    #[display(fmt = "Window is not in H:MM-H:MM form")]
    Malformed,
    /// 時か分が範囲外です
    #[display(fmt = "Hour or minute out of range")]
    OutOfRange,
    /// 開始が終了より後です
    #[display(fmt = "Start is not before end")]
    NotIncreasing,
    /// 枠の境界に揃っていません
    #[display(fmt = "Window is not aligned to the slot boundary")]
    Misaligned,
    /// 枠の長さが一致しません
    #[display(fmt = "Window does not span exactly one slot")]
    WrongDuration,
}

/// 枠として登録できる時間帯かを検証する
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotValidator {
    minutes: u16,
}

impl SlotValidator {
    pub fn new(minutes: u16) -> Self {
        Self { minutes }
    }

    pub fn validate(&self, window: &str) -> bool {
        self.admit(window).is_ok()
    }

    pub fn admit(&self, window: &str) -> Result<TimeWindow, WindowError> {
        let window = window.parse::<TimeWindow>()?;
        self.check(&window)?;
        Ok(window)
    }

    pub fn check(&self, window: &TimeWindow) -> Result<(), WindowError> {
        if window.start >= window.end {
            return Err(WindowError::NotIncreasing);
        }
        let aligned = |minute: u16| matches!((minute % 60).checked_rem(self.minutes), Some(0));
        if !aligned(window.start) || !aligned(window.end) {
            return Err(WindowError::Misaligned);
        }
        if window.duration() != self.minutes {
            return Err(WindowError::WrongDuration);
        }
        Ok(())
    }
}

impl Default for SlotValidator {
    fn default() -> Self {
        Self::new(SLOT_MINUTES)
    }
}
