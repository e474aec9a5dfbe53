// Commandline argument parser using clap for physio-acq

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Headless physiological signal acquisition and recording")]
pub struct AcqArgs {
    /// Config file to use instead of the one in the user config directory
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Serial device to read from, e.g. /dev/ttyUSB0 or COM3
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// Replay a raw byte capture instead of opening a serial port
    #[arg(long = "replay", conflicts_with = "port")]
    pub replay: Option<PathBuf>,

    /// Directory recordings are written to
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Stop after this many seconds; runs until the link drops otherwise
    #[arg(short = 'd', long = "duration")]
    pub duration: Option<f64>,

    /// Periodically upload the trailing window for emotion classification
    #[arg(short = 'u', long = "upload")]
    pub upload: bool,

    /// Do not write a CSV recording
    #[arg(long = "no-record")]
    pub no_record: bool,
}

impl AcqArgs {
    /// Overlay the values given on the commandline onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(dir) = &self.output_dir {
            config.recording.output_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = AcqArgs::parse_from([
            "physio-acq",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "115200",
            "--output-dir",
            "/tmp/out",
            "--upload",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.recording.output_dir, PathBuf::from("/tmp/out"));
        assert!(args.upload);
        assert!(!args.no_record);
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = AcqArgs::parse_from(["physio-acq", "--no-record", "-d", "2.5"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config, Config::default());
        assert_eq!(args.duration, Some(2.5));
        assert!(args.no_record);
    }

    #[test]
    fn test_replay_conflicts_with_port() {
        let parsed = AcqArgs::try_parse_from(["physio-acq", "--port", "COM3", "--replay", "capture.bin"]);
        assert!(parsed.is_err());
    }
}
