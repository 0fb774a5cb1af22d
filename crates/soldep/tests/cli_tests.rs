// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_command() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deploys arbitrary contracts"));
}

#[test]
fn test_version_command() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("soldep"));
}

#[test]
fn test_deploy_subcommand_help() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("deploy")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deploys the given contract on the EVM chain"));
}

#[test]
fn test_tx_subcommand_help() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("tx")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Creates a transaction"))
        .stdout(predicate::str::contains("ADDRESS"))
        .stdout(predicate::str::contains("METHOD"));
}

#[test]
fn test_call_subcommand_help() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("call")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Calls a method of a particular contract"));
}

#[test]
fn test_logs_subcommand_help() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.arg("logs")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loads logs of a particular event"));
}

#[test]
fn test_tx_rejects_invalid_address() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.args(["tx", "not-an-address", "method"])
        .env("DEPLOYER_FROM_PK", "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid contract address"));
}

#[test]
fn test_logs_rejects_invalid_tx_hash() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.args([
        "logs",
        "0x0000000000000000000000000000000000000000",
        "not-a-hash",
        "SomeEvent",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid transaction hash"));
}

#[test]
fn test_unknown_coverage_mode_rejected() {
    let mut cmd = Command::cargo_bin("soldep").unwrap();
    cmd.args([
        "--cover",
        "--cover-mode",
        "bogus",
        "tx",
        "0x0000000000000000000000000000000000000001",
        "poke",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported coverage mode"));
}
