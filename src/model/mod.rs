pub mod attendance;
pub mod break_entry;
pub mod role;
pub mod schedule;
pub mod session;

/// Lets `sqlx::FromRow` decode snake_case status columns into strum enums.
macro_rules! string_column {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = strum::ParseError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value.parse()
                }
            }
        )+
    };
}

string_column!(
    attendance::AttendanceStatus,
    attendance::OvertimeStatus,
    session::SessionStatus,
);
