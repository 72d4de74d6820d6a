pub mod attendance;
pub mod sessions;

use crate::{
    engine::AttendanceEngine,
    events::TracingEventSink,
    store::mysql::{MySqlSettingsStore, MySqlStore},
};

/// The engine as wired into the HTTP server.
pub type AppEngine = AttendanceEngine<MySqlStore, MySqlSettingsStore, TracingEventSink>;

/// Wall-clock time in the server's local zone; shifts are scheduled in local time.
pub(crate) fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
