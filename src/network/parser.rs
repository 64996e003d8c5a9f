// file: src/network/parser.rs
// version: 1.0.0
// guid: e5a93c17-2f6d-4b08-8c41-9d7b0f3e6a52

//! Structured parsing of Catalyst show command output

use regex::Regex;
use serde::Serialize;

use crate::device::StackMember;
use crate::{Result, UpgradeError};

/// Fields taken from "show version"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub version: String,
    /// Model numbers of the stack members, active switch first
    pub hardware: Vec<String>,
}

/// Fields taken from "show boot"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootRecord {
    pub boot_path: String,
}

/// Converts raw show output into records
pub trait OutputParser: Send + Sync {
    fn parse_version(&self, output: &str) -> Result<VersionRecord>;
    fn parse_switch_detail(&self, output: &str) -> Result<Vec<StackMember>>;
    fn parse_boot(&self, output: &str) -> Result<BootRecord>;
}

/// Regex parser for IOS and IOS-XE output
#[derive(Debug, Clone)]
pub struct IosOutputParser {
    version: Regex,
    version_fallback: Regex,
    model_number: Regex,
    processor: Regex,
    member_row: Regex,
    boot_path: Regex,
}

impl IosOutputParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| UpgradeError::config(format!("Invalid regex pattern: {}", e)))
        };

        Ok(Self {
            version: compile(r"(?m)^Cisco IOS Software.*?,\s*Version\s+([^,\s]+)")?,
            version_fallback: compile(r"(?mi)^.*\bVersion\s+([0-9][^,\s]*)")?,
            model_number: compile(r"(?mi)^\s*Model number\s*:\s*(\S+)")?,
            processor: compile(r"(?mi)^cisco\s+(\S+)\s+\(.*\)\s+processor")?,
            member_row: compile(
                r"(?m)^\s*\*?(\d+)\s+\S+\s+[0-9a-fA-F]{4}\.[0-9a-fA-F]{4}\.[0-9a-fA-F]{4}\s+\d+\s+\S+\s+(\S.*?)\s*$",
            )?,
            boot_path: compile(r"(?mi)^BOOT\s+(?:path-list\s*:|variable\s*=)\s*([^;\s]+)")?,
        })
    }
}

fn reject_cli_error(output: &str, command: &str) -> Result<()> {
    if output.contains("% Invalid input") || output.contains("% Incomplete command") {
        return Err(UpgradeError::parse(format!("Device rejected \"{}\"", command)));
    }
    Ok(())
}

impl OutputParser for IosOutputParser {
    fn parse_version(&self, output: &str) -> Result<VersionRecord> {
        reject_cli_error(output, "show version")?;

        let version = self
            .version
            .captures(output)
            .or_else(|| self.version_fallback.captures(output))
            .map(|c| c[1].to_string())
            .ok_or_else(|| UpgradeError::parse("No software version in show version output"))?;

        let mut hardware: Vec<String> = self
            .model_number
            .captures_iter(output)
            .map(|c| c[1].to_string())
            .collect();
        if hardware.is_empty() {
            hardware = self
                .processor
                .captures_iter(output)
                .map(|c| c[1].to_string())
                .collect();
        }
        if hardware.is_empty() {
            return Err(UpgradeError::parse("No hardware model in show version output"));
        }

        Ok(VersionRecord { version, hardware })
    }

    fn parse_switch_detail(&self, output: &str) -> Result<Vec<StackMember>> {
        reject_cli_error(output, "show switch detail")?;

        let members = self
            .member_row
            .captures_iter(output)
            .map(|c| {
                let switch_id = c[1]
                    .parse::<u8>()
                    .map_err(|e| UpgradeError::parse(format!("Bad switch number {}: {}", &c[1], e)))?;
                Ok(StackMember {
                    switch_id,
                    state: c[2].to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if members.is_empty() {
            return Err(UpgradeError::parse("No stack members in show switch detail output"));
        }
        Ok(members)
    }

    fn parse_boot(&self, output: &str) -> Result<BootRecord> {
        reject_cli_error(output, "show boot")?;

        self.boot_path
            .captures(output)
            .map(|c| BootRecord {
                boot_path: c[1].to_string(),
            })
            .ok_or_else(|| UpgradeError::parse("No boot path in show boot output"))
    }
}
