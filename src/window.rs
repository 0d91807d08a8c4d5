use chrono::{DateTime, Duration, Utc};

/// Trailing window anchored at the run's start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    pub cutoff: Duration,
    pub reference: DateTime<Utc>,
}

impl FreshnessWindow {
    pub fn new(cutoff: Duration, reference: DateTime<Utc>) -> Self {
        Self { cutoff, reference }
    }

    /// Window of `cutoff` ending now.
    pub fn starting_now(cutoff: Duration) -> Self {
        Self::new(cutoff, Utc::now())
    }

    pub fn age(&self, instant: DateTime<Utc>) -> Duration {
        self.reference - instant
    }

    /// Instants after the reference have a negative age and count as fresh.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.age(instant) <= self.cutoff
    }
}

/// Renders an age as "3 days 4 hours" style text; negative ages read "just now".
pub fn humanize_age(age: Duration) -> String {
    if age < Duration::minutes(1) {
        return "just now".to_string();
    }
    let days = age.num_days();
    let hours = age.num_hours() % 24;
    let minutes = age.num_minutes() % 60;

    let unit = |n: i64, name: &str| {
        if n == 1 {
            format!("1 {}", name)
        } else {
            format!("{} {}s", n, name)
        }
    };

    let parts: Vec<String> = if days > 0 {
        std::iter::once(unit(days, "day"))
            .chain((hours > 0).then(|| unit(hours, "hour")))
            .collect()
    } else if hours > 0 {
        std::iter::once(unit(hours, "hour"))
            .chain((minutes > 0).then(|| unit(minutes, "minute")))
            .collect()
    } else {
        vec![unit(minutes, "minute")]
    };
    format!("{} ago", parts.join(" "))
}
