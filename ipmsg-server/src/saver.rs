//! File-backed persistence for received messages. Records new sender
//! aliases before appending to the log.

use std::path::Path;

use ipmsg_core::{store, AliasStore, Message};

use crate::server::MsgSaver;

/// Appends each message to the plain-text log, annotating the sender with
/// a known alias as `name(address)`.
#[derive(Debug, Clone)]
pub struct FileSaver {
    aliases: AliasStore,
}

impl FileSaver {
    pub fn new(aliases: AliasStore) -> Self {
        Self { aliases }
    }
}

impl MsgSaver for FileSaver {
    fn save(&self, path: &Path, msg: &Message) -> anyhow::Result<()> {
        if !msg.alias.is_empty() {
            self.aliases.add(&msg.alias, &msg.from)?;
        }
        let names = self.aliases.names()?;
        let from = match names.get(&msg.from) {
            Some(name) => format!("{}({})", name, msg.from),
            None => msg.from.clone(),
        };
        store::append_message(path, msg, &from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(alias: &str) -> Message {
        Message {
            from: "192.168.1.20".to_string(),
            alias: alias.to_string(),
            len: 5,
            date: 1_700_000_000,
            body: "hello".to_string(),
        }
    }

    #[test]
    fn aliased_sender_is_recorded_and_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = AliasStore::new(dir.path().join("alias.txt"));
        let saver = FileSaver::new(aliases.clone());
        let log = dir.path().join("ipmsg.txt");

        saver.save(&log, &sample("alex")).unwrap();

        assert_eq!(
            aliases.resolve("alex").unwrap().as_deref(),
            Some("192.168.1.20")
        );
        let stored = store::parse_file(&log).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alias, "alex");
        assert_eq!(stored[0].from, "192.168.1.20");
    }

    #[test]
    fn known_sender_is_annotated_without_an_alias_line() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = AliasStore::new(dir.path().join("alias.txt"));
        aliases.add("alex", "192.168.1.20").unwrap();
        let saver = FileSaver::new(aliases);
        let log = dir.path().join("ipmsg.txt");

        // Message itself carries no alias; the store already knows one.
        saver.save(&log, &sample("")).unwrap();

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("alex(192.168.1.20)"));
    }

    #[test]
    fn unknown_sender_keeps_the_bare_address() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(AliasStore::new(dir.path().join("alias.txt")));
        let log = dir.path().join("ipmsg.txt");

        saver.save(&log, &sample("")).unwrap();

        let stored = store::parse_file(&log).unwrap();
        assert_eq!(stored[0].from, "192.168.1.20");
        assert_eq!(stored[0].alias, "");
    }
}
