use clap::Parser;

/// Smoke-tests a student CRUD service end to end
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the service under test. Falls back to the QA_URL
    /// environment variable, then to http://localhost:8082
    #[arg(short, long)]
    pub service_url: Option<String>,

    /// Attempts per request before giving up
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 10)]
    pub retry_delay: u64,
}
