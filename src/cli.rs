use crate::bundle::Credentials;
use crate::Target;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ottobit-blocks",
    about = "Compile saved Ottobit block workspaces to Python or JavaScript, or assemble a micro:bit firmware bundle."
)]
pub struct Args {
    #[arg(value_name = "WORKSPACE")]
    pub workspace: PathBuf,

    #[arg(value_name = "OUTPUT", help = "Write the result here instead of stdout.")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Target::Python)]
    pub target: Target,

    #[arg(
        long,
        help = "Inline the program into the firmware template instead of printing bare code."
    )]
    pub bundle: bool,

    #[arg(long, help = "Firmware template to use with --bundle (defaults to the built-in one).")]
    pub template: Option<PathBuf>,

    #[arg(long, help = "Challenge JSON embedded into the bundle.")]
    pub challenge: Option<PathBuf>,

    #[arg(long, env = "OTTOBIT_WIFI_SSID", default_value = "")]
    pub wifi_ssid: String,

    #[arg(
        long,
        env = "OTTOBIT_WIFI_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub wifi_password: String,

    #[arg(long, env = "OTTOBIT_ROOM_ID", default_value = "")]
    pub room_id: String,

    #[arg(long, help = "Clamp and clean invalid field values before compiling.")]
    pub sanitize: bool,

    #[arg(
        long,
        help = "Only validate field values; fail when any is invalid."
    )]
    pub check: bool,
}

impl Args {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            network_name: self.wifi_ssid.clone(),
            network_secret: self.wifi_password.clone(),
            session_id: self.room_id.clone(),
        }
    }
}
