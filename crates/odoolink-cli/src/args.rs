use argh::FromArgs;

#[derive(FromArgs, Debug)]
/// odoolink - resilient Odoo RPC from the command line
pub struct Cli {
    #[argh(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands.
///
/// - **Call**: run one `execute_kw` call and print its JSON result
/// - **Ping**: check reachability and credentials of configured instances
#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Commands {
    Call(CallArgs),
    Ping(PingArgs),
}

/// Arguments for a single model method call.
///
/// # Example
///
/// ```bash
/// odoolink call -c instances.json -i prod res.partner search_read \
///   --args '[[["is_company", "=", true]]]' --kwargs '{"fields": ["name"], "limit": 5}'
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "call")]
/// call a model method on an instance
pub struct CallArgs {
    /// path to the JSON file listing instances
    #[argh(option, short = 'c', long = "config")]
    pub config: String,

    /// instance to call; optional when the file lists exactly one
    #[argh(option, short = 'i', long = "instance")]
    pub instance: Option<String>,

    /// technical model name, e.g. res.partner
    #[argh(positional)]
    pub model: String,

    /// model method, e.g. search_read
    #[argh(positional)]
    pub method: String,

    /// positional arguments as a JSON array
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    pub args: String,

    /// keyword arguments as a JSON object
    #[argh(option, short = 'k', long = "kwargs", default = "\"{}\".into()")]
    pub kwargs: String,

    /// total attempts for transient failures
    #[argh(option, long = "retries", default = "3")]
    pub retries: u32,

    /// base backoff between attempts in milliseconds
    #[argh(option, long = "backoff-ms", default = "500")]
    pub backoff_ms: u64,
}

/// Arguments for the connectivity check.
///
/// Reports the server version and authenticated user id of each instance.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "ping")]
/// check connectivity and credentials
pub struct PingArgs {
    /// path to the JSON file listing instances
    #[argh(option, short = 'c', long = "config")]
    pub config: String,

    /// instance to check; all configured instances when omitted
    #[argh(option, short = 'i', long = "instance")]
    pub instance: Option<String>,
}
