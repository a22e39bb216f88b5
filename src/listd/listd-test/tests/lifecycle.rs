/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/
use listd_common::{metadata::keys, Metadata, QueueName, RunnerKind};
use listd_config::Config;
use listd_mlist::{DigestFormat, ListStore, MailingList, Member};
use listd_server::StopHandle;
use lqueue::{Extension, Slice, Switchboard};
use pretty_assertions::assert_eq;

fn create_list(config: &Config, threshold_kb: u64) -> ListStore {
    let store = ListStore::new(config);
    let mut list = MailingList::new("test", "lists.testserver.com");
    list.owners.push("owner@domain.tld".to_string());
    list.add_member(Member::new("user@domain.tld"));
    list.add_member(Member::new("other@domain.tld"));
    list.add_member(Member::new("mime@domain.tld").with_digest(DigestFormat::Mime));
    list.add_member(Member::new("plain@domain.tld").with_digest(DigestFormat::Plain));
    list.digest.size_threshold_kb = threshold_kb;
    store.create(&list).unwrap();
    store
}

fn run(config: &Config, kind: RunnerKind) {
    listd_server::start_runner(config, kind, Slice::whole(), true, StopHandle::new()).unwrap();
}

fn pending(config: &Config, queue: QueueName) -> usize {
    Switchboard::open(config, queue)
        .unwrap()
        .files(Extension::Pck)
        .unwrap()
        .len()
}

fn delivered(config: &Config) -> Vec<String> {
    let dir = config.server.queues.dirpath.parent().unwrap().join("outgoing");
    let mut files = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn post(config: &Config, subject: &str) {
    Switchboard::open(config, QueueName::In)
        .unwrap()
        .enqueue(
            &listd_test::mail::local_post("test", "user@domain.tld", subject),
            &Metadata::for_list("test"),
        )
        .unwrap();
}

#[test]
fn post_is_delivered_and_archived() {
    let root = tempfile::tempdir().unwrap();
    let config = listd_test::config::local_test(root.path());
    let store = create_list(&config, 30);

    post(&config, "hello world");
    run(&config, RunnerKind::Incoming);
    assert_eq!(pending(&config, QueueName::In), 0);
    assert_eq!(pending(&config, QueueName::Out), 1);
    assert_eq!(pending(&config, QueueName::Archive), 1);
    assert!(store.digest_path("test").exists());

    run(&config, RunnerKind::Outgoing);
    run(&config, RunnerKind::Archive);
    assert_eq!(pending(&config, QueueName::Out), 0);
    assert_eq!(pending(&config, QueueName::Shunt), 0);

    let delivered = delivered(&config);
    assert_eq!(delivered.len(), 1);
    let envelope_to = delivered[0]
        .lines()
        .find_map(|line| line.strip_prefix("X-Envelope-To: "))
        .unwrap();
    let mut recipients = envelope_to.split(", ").collect::<Vec<_>>();
    recipients.sort_unstable();
    assert_eq!(recipients, vec!["other@domain.tld", "user@domain.tld"]);
    assert!(delivered[0].contains("X-BeenThere: test@lists.testserver.com"));
    assert!(delivered[0].contains("List-Id: <test.lists.testserver.com>"));

    let archived = listd_common::mbox::read_all(
        &config.server.archive.dirpath.join("test.mbox"),
    )
    .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].subject(), Some("hello world"));
    assert_eq!(store.load("test").unwrap().post_id, 2);
}

#[test]
fn digest_cut_reaches_digest_members() {
    let root = tempfile::tempdir().unwrap();
    let config = listd_test::config::local_test(root.path());
    let store = create_list(&config, 30);

    for subject in ["first", "second", "third"] {
        post(&config, subject);
    }
    run(&config, RunnerKind::Incoming);
    assert_eq!(pending(&config, QueueName::Virgin), 0);

    let virgin = Switchboard::open(&config, QueueName::Virgin).unwrap();
    let sent =
        listd_server::digest::send_all_pending(&store, &config.server.digest, &virgin, Some("test"))
            .unwrap();
    assert_eq!(sent, 1);
    assert!(!store.digest_path("test").exists());

    let mut digests = virgin
        .files(Extension::Pck)
        .unwrap()
        .into_iter()
        .map(|id| virgin.read(&id, Extension::Pck).unwrap())
        .collect::<Vec<_>>();
    digests.sort_by_key(|(_, metadata)| metadata.recips());
    assert_eq!(digests.len(), 2);

    let (mime, metadata) = &digests[0];
    assert_eq!(metadata.recips(), Some(vec!["mime@domain.tld".to_string()]));
    assert!(metadata.flag(keys::ISDIGEST));
    let issue = mime
        .parts()
        .iter()
        .find(|part| part.content_type().0 == "multipart/digest")
        .unwrap();
    assert_eq!(issue.parts().len(), 3);

    let (plain, metadata) = &digests[1];
    assert_eq!(metadata.recips(), Some(vec!["plain@domain.tld".to_string()]));
    let text = plain.text_content().unwrap();
    assert!(text.contains("Message: 3"));
    assert!(text.contains("End of test Digest, Vol 1, Issue 1"));

    let list = store.load("test").unwrap();
    assert_eq!(list.digest.next_issue, 2);
    assert!(list.digest.last_sent.is_some());

    run(&config, RunnerKind::Virgin);
    assert_eq!(pending(&config, QueueName::Out), 5);
}

#[test]
fn nonmember_post_is_held_then_released() {
    let root = tempfile::tempdir().unwrap();
    let config = listd_test::config::local_test(root.path());
    let store = create_list(&config, 30);

    Switchboard::open(&config, QueueName::In)
        .unwrap()
        .enqueue(
            &listd_test::mail::local_post("test", "stranger@else.tld", "let me in"),
            &Metadata::for_list("test"),
        )
        .unwrap();
    run(&config, RunnerKind::Incoming);
    assert_eq!(pending(&config, QueueName::Out), 0);
    assert_eq!(pending(&config, QueueName::Virgin), 2);

    let cookies = store.pending("test").cookies().unwrap();
    assert_eq!(cookies.len(), 1);
    assert!(matches!(
        listd_server::confirm(&config, "test", &cookies[0]).unwrap(),
        listd_server::Confirmed::Released { .. }
    ));

    run(&config, RunnerKind::Incoming);
    assert_eq!(pending(&config, QueueName::Out), 1);
}

#[test]
fn bounces_disable_a_member() {
    let root = tempfile::tempdir().unwrap();
    let config = listd_test::config::local_test(root.path());
    let store = create_list(&config, 30);
    let mut list = store.load("test").unwrap();
    list.bounce.score_threshold = 1.0;
    store.save(&list).unwrap();

    Switchboard::open(&config, QueueName::Bounces)
        .unwrap()
        .enqueue(
            &listd_test::mail::local_dsn("test-bounces@lists.testserver.com", "other@domain.tld"),
            &Metadata::for_list("test"),
        )
        .unwrap();
    run(&config, RunnerKind::Bounce);

    let list = store.load("test").unwrap();
    assert_eq!(
        list.delivery_status("other@domain.tld"),
        Some(listd_common::DeliveryStatus::ByBounce)
    );
    assert_eq!(
        list.regular_recipients()
            .map(|member| member.address.as_str())
            .collect::<Vec<_>>(),
        vec!["user@domain.tld"]
    );
    assert!(pending(&config, QueueName::Virgin) >= 1);
}
