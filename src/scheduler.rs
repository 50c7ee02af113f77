//! Daily per-channel triggers.
//!
//! The loop polls on a short fixed tick instead of arming precise timers, so
//! clock jumps and process suspension only ever delay a trigger. A trigger that
//! was missed for several days fires once, not once per missed day.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::ChannelType;
use crate::error::YtAutoError;

/// Channel → time of day at which it gets one job, every day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    slots: BTreeMap<ChannelType, NaiveTime>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            slots: ChannelType::ALL
                .into_iter()
                .map(|channel| (channel, channel.default_slot()))
                .collect(),
        }
    }
}

impl Schedule {
    pub fn empty() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    pub fn with_slot(mut self, channel: ChannelType, at: NaiveTime) -> Self {
        self.slots.insert(channel, at);
        self
    }

    /// Parse `channel = "HH:MM"` pairs (seconds optional).
    pub fn parse<'a, I>(entries: I) -> Result<Self, YtAutoError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut slots = BTreeMap::new();
        for (channel, value) in entries {
            let at = parse_time_of_day(value).ok_or_else(|| YtAutoError::InvalidSchedule {
                channel: channel.to_string(),
                value: value.to_string(),
            })?;
            slots.insert(channel.parse::<ChannelType>()?, at);
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> impl Iterator<Item = (ChannelType, NaiveTime)> + '_ {
        self.slots.iter().map(|(channel, at)| (*channel, *at))
    }

    pub fn get(&self, channel: ChannelType) -> Option<NaiveTime> {
        self.slots.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

#[derive(Debug)]
struct Trigger {
    channel: ChannelType,
    at: NaiveTime,
    next_run: NaiveDateTime,
}

/// Due-time bookkeeping for a [`Schedule`], on local wall-clock time.
#[derive(Debug)]
pub struct DailyTriggers {
    triggers: Vec<Trigger>,
}

impl DailyTriggers {
    pub fn new(schedule: &Schedule, now: NaiveDateTime) -> Self {
        Self {
            triggers: schedule
                .slots()
                .map(|(channel, at)| Trigger {
                    channel,
                    at,
                    next_run: next_occurrence(at, now),
                })
                .collect(),
        }
    }

    /// Channels whose trigger is due at `now`; each is re-armed for its next
    /// occurrence after `now`.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<ChannelType> {
        let mut fired = Vec::new();
        for trigger in &mut self.triggers {
            if now >= trigger.next_run {
                fired.push(trigger.channel);
                trigger.next_run = next_occurrence(trigger.at, now);
            }
        }
        fired
    }

    pub fn next_run(&self, channel: ChannelType) -> Option<NaiveDateTime> {
        self.triggers
            .iter()
            .find(|t| t.channel == channel)
            .map(|t| t.next_run)
    }
}

fn next_occurrence(at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Poll `schedule` every `tick` until `cancel` fires, calling `fire` once per
/// due trigger. `fire` must not block.
pub(crate) async fn run_loop<F>(
    schedule: Schedule,
    tick: Duration,
    cancel: CancellationToken,
    mut fire: F,
) where
    F: FnMut(ChannelType) + Send,
{
    let mut triggers = DailyTriggers::new(&schedule, Local::now().naive_local());
    for (channel, at) in schedule.slots() {
        info!(channel = %channel, time = %at.format("%H:%M"), "Schedule registered");
    }

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for channel in triggers.due(Local::now().naive_local()) {
                    info!(channel = %channel, "Scheduled trigger fired");
                    fire(channel);
                }
            }
        }
    }

    info!("Scheduler stopped");
}
