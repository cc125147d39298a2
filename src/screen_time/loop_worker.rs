use chrono::Local;
use log::{debug, error, info};
use tokio::{
    sync::watch,
    time::{self, Duration, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{controller::ScreenTimeContext, next_daily_reset};

const SCREEN_TIME_TICK_SECS: u64 = 60;

pub async fn screen_time_loop(
    ctx: ScreenTimeContext,
    mut interval_rx: watch::Receiver<u32>,
    cancel_token: CancellationToken,
) {
    let mut minute_ticker = delayed_interval(Duration::from_secs(SCREEN_TIME_TICK_SECS));
    let mut reminder_ticker = reminder_interval(*interval_rx.borrow_and_update());
    let daily_reset = time::sleep_until(next_reset_instant());
    tokio::pin!(daily_reset);

    loop {
        tokio::select! {
            _ = minute_ticker.tick() => {
                match ctx.record_minute().await {
                    Ok(total) => debug!("screen time today: {total}s"),
                    Err(err) => error!("screen time tick failed: {err:#}"),
                }
            }
            _ = reminder_ticker.tick() => {
                if ctx.remind().await {
                    info!("Focus reminder sent");
                }
            }
            _ = &mut daily_reset => {
                match ctx.reset_daily().await {
                    Ok(()) => info!("Daily screen time reset"),
                    Err(err) => error!("daily screen time reset failed: {err:#}"),
                }
                daily_reset.as_mut().reset(next_reset_instant());
            }
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let minutes = *interval_rx.borrow_and_update();
                reminder_ticker = reminder_interval(minutes);
                debug!("reminder re-armed for every {minutes} minutes");
            }
            _ = cancel_token.cancelled() => {
                info!("screen time loop shutting down");
                break;
            }
        }
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn reminder_interval(minutes: u32) -> Interval {
    delayed_interval(Duration::from_secs(u64::from(minutes.max(1)) * 60))
}

fn next_reset_instant() -> Instant {
    let now = Local::now();
    let wait = (next_daily_reset(&now) - now)
        .to_std()
        .unwrap_or(Duration::ZERO);
    Instant::now() + wait
}
