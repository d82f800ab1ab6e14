use std::fs;
use std::path::Path;

use predicates::prelude::*;
use tempfile::tempdir;

const VENDOR_LOG: &str = "5e1819d9-11a9-400c-811f-d60719403d86";

fn write_profile(dir: &Path) -> String {
    let path = dir.join("memdevs.json");
    let profile = format!(
        r#"{{
            "memdevs": [
                {{
                    "name": "mem0",
                    "firmware_version": "FW 2.1",
                    "pmem_size": 1073741824,
                    "ram_size": 268435456,
                    "lsa_size": 131072,
                    "logs": [{{ "uuid": "{VENDOR_LOG}", "data": "000102030405060708090a0b0c0d0e0f4142" }}]
                }},
                {{
                    "name": "mem1",
                    "faults": {{ "retval": 4 }}
                }}
            ]
        }}"#
    );
    fs::write(&path, profile).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn list_single_memdev_prints_object() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    let out = assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args(["list", "-d", "mem0", "--profile", &profile])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["memdev"], "mem0");
    assert_eq!(json["pmem_size"], 1073741824u64);
    assert_eq!(json["ram_size"], 268435456u64);
    assert_eq!(json["firmware_version"], "FW 2.1");
    assert_eq!(json["lsa_size"], 131072u64);
    assert!(json.get("commands").is_none());
}

#[test]
fn list_human_verbose_includes_commands() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    let out = assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .env("CXL_MEMDEV_PROFILE", &profile)
        .args(["list", "-d", "0", "-u", "-v"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["pmem_size"], "0x40000000");
    let names: Vec<&str> = json["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        ["Identify Command", "Raw device command", "Get Supported Logs", "Get Log"]
    );
}

#[test]
fn list_memdevs_and_idle_flags_keep_the_same_output() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    let out = assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args(["list", "-D", "-i", "-d", "mem0", "--profile", &profile])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["memdev"], "mem0");
    assert_eq!(json["pmem_size"], 1073741824u64);
}

#[test]
fn list_reports_failing_device_but_prints_the_rest() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args(["list", "--profile", &profile])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"memdev\": \"mem0\""))
        .stderr(predicate::str::contains("mem1: identify"));
}

#[test]
fn default_device_without_profile() {
    assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .env_remove("CXL_MEMDEV_PROFILE")
        .args(["query", "mem0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Get Log\""))
        .stdout(predicate::str::contains("\"size_out\": 67"));
}

#[test]
fn get_log_dumps_remaining_bytes() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args([
            "get-log",
            "mem0",
            "--uuid",
            VENDOR_LOG,
            "--offset",
            "0x10",
            "--profile",
            &profile,
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("00000010: 41 42"))
        .stdout(predicate::str::contains("AB"));
}

#[test]
fn get_log_unknown_uuid_fails() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args([
            "get-log",
            "mem0",
            "--uuid",
            "00000000-0000-0000-0000-000000000001",
            "--profile",
            &profile,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not supported"));
}

#[test]
fn raw_identify_opcode() {
    let dir = tempdir().unwrap();
    let profile = write_profile(dir.path());

    let out = assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .args([
            "raw",
            "mem0",
            "--opcode",
            "0x4000",
            "--out-size",
            "67",
            "--profile",
            &profile,
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["opcode"], "0x4000");
    assert_eq!(json["retval"], 0);
    assert_eq!(json["size_out"], 67);
    let payload = json["payload"].as_str().unwrap();
    assert!(payload.starts_with(&hex::encode("FW 2.1")));
}

#[test]
fn unknown_memdev_is_an_error() {
    assert_cmd::cargo::cargo_bin_cmd!("cxl")
        .env_remove("CXL_MEMDEV_PROFILE")
        .args(["query", "mem7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no memdev named"));
}
