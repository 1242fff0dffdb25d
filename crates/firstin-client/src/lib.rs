pub mod adapter;
pub mod analyzer;
pub mod ashby;
pub mod gem;
pub mod greenhouse;
pub mod http;
pub mod lever;
pub mod microsoft;
pub mod notify;
pub mod text;
pub mod workday;

pub use adapter::Adapter;
pub use analyzer::{AnyAnalyzer, LlmAnalyzer};
pub use ashby::AshbyAdapter;
pub use gem::GemAdapter;
pub use greenhouse::GreenhouseAdapter;
pub use http::build_client;
pub use lever::LeverAdapter;
pub use microsoft::MicrosoftAdapter;
pub use notify::{send_test_notification, AnyNotifier, LogNotifier, SlackNotifier};
pub use workday::WorkdayAdapter;
