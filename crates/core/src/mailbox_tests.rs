// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::worker::WorkerId;

#[test]
fn new_entry_is_undelivered() {
    let entry = MailboxEntry::new(
        MailAddress::Leader,
        MailAddress::Worker(WorkerId::for_slot("crew-x", 0)),
        "assign task 1",
        1_000,
    );
    assert!(!entry.delivered);
    assert!(entry.id.as_str().starts_with("msg-"));
}

#[test]
fn address_file_stem_is_path_safe() {
    let addr = MailAddress::Worker(WorkerId::for_slot("crew-x", 3));
    assert!(!addr.file_stem().contains('/'));
    assert_eq!(MailAddress::Leader.file_stem(), "leader");
}

#[test]
fn entry_serde_round_trip() {
    let entry = MailboxEntry::new(
        MailAddress::Worker(WorkerId::for_slot("crew-x", 1)),
        MailAddress::Leader,
        "ack task 2",
        2_000,
    );
    let json = serde_json::to_string(&entry).unwrap();
    let parsed: MailboxEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entry);
}
