/// The extended day axis: a 24-hour window starting at a configured hour
/// (05:00 by default) and running through the same hour the next calendar
/// day, so late-night activity maps contiguously past the 24:00 boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for DayWindow {
    fn default() -> Self {
        Self {
            start_hour: 5,
            end_hour: 29,
            slot_minutes: 15,
        }
    }
}

impl DayWindow {
    pub fn new(start_hour: u32, end_hour: u32, slot_minutes: u32) -> Self {
        Self {
            start_hour,
            end_hour,
            slot_minutes,
        }
    }

    /// Parses an `HH:MM` wall-clock string into minutes from midnight on the
    /// extended axis. Times before the window's start hour belong to the
    /// next calendar day and get 1440 added. `None` only for malformed text.
    pub fn time_to_minutes(&self, text: &str) -> Option<u32> {
        let mut split = text.trim().split(':');
        let hour = split.next()?.parse::<u32>().ok()?;
        let minute = split.next()?.parse::<u32>().ok()?;
        if split.next().is_some() || hour > 23 || minute > 59 {
            return None;
        }

        let mut total = hour * 60 + minute;
        if total < self.start_hour * 60 {
            total += 24 * 60;
        }
        Some(total)
    }

    /// Inverse formatting; the extended-axis wrap is invisible in display
    /// form (hours fold back into 0-23).
    pub fn minutes_to_time(&self, minutes: u32) -> String {
        let hour = (minutes / 60) % 24;
        let minute = minutes % 60;
        format!("{hour:02}:{minute:02}")
    }

    /// Slot start offsets across the whole window, in timeline order.
    pub fn slots(&self) -> impl Iterator<Item = u32> {
        let step = self.slot_minutes.max(1) as usize;
        (self.start_hour * 60..self.end_hour * 60).step_by(step)
    }
}
