use rand::Rng;
use std::thread;
use std::time::Duration;

/// `d` with +/-30% random jitter, never below 10ms.
pub fn jittered(d: Duration) -> Duration {
    let secs = d.as_secs_f64();
    let jitter = secs * 0.3;
    let actual = if jitter > 0.0 {
        secs + rand::thread_rng().gen_range(-jitter..jitter)
    } else {
        secs
    };
    Duration::from_secs_f64(actual.max(0.01))
}

/// Sleep for `d` with jitter, so input timing is not metronomic.
pub fn pause_jitter(d: Duration) {
    thread::sleep(jittered(d));
}
