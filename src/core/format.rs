/// AFL-like duration: "1 days, 2 hrs, 34 min, 56 sec", leading zero units omitted
pub fn format_seconds(seconds: i64) -> String {
    if seconds < 60 {
        return format!("{seconds} sec");
    }

    let s = seconds % 60;
    let m = (seconds / 60) % 60;
    let h = (seconds / 3600) % 24;
    let d = seconds / 86400;

    if d > 0 {
        format!("{d} days, {h} hrs, {m} min, {s} sec")
    } else if h > 0 {
        format!("{h} hrs, {m} min, {s} sec")
    } else {
        format!("{m} min, {s} sec")
    }
}

/// Shorten big counters: "1.1K", "1.23M", "1.2345B". Below 1000 as is.
pub fn format_big_number(number: u64) -> String {
    const SUFFIXES: [(u64, &str, usize); 3] = [
        (1_000_000_000, "B", 4),
        (1_000_000, "M", 2),
        (1_000, "K", 1),
    ];

    for (divisor, letter, places) in SUFFIXES {
        if number >= divisor {
            return format!("{:.*}{letter}", places, number as f64 / divisor as f64);
        }
    }
    number.to_string()
}
