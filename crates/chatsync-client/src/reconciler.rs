//! Merging conversation snapshots into the rendered transcript.
//!
//! The [`Reconciler`] mirrors what this tab has put on screen: the ids of
//! confirmed messages, the local echoes still waiting for their server copy,
//! and whether an intro was shown. For each snapshot it produces a
//! [`Reconciliation`], a plan of surface updates the engine applies in order.
//! It never touches storage; the acknowledged id is passed in and the id to
//! advance to is handed back.

use std::collections::HashSet;

use tracing::{debug, warn};

use chatsync_shared::asset::PhotoSource;
use chatsync_shared::constants::WHATSAPP_LINK_PREFIX;
use chatsync_shared::{
    ChatError, ConversationSnapshot, Direction, Message, MessageId, Mode, OperatorInfo,
};

use crate::config::Translations;
use crate::session::ModeObservation;
use crate::surface::{EchoId, Intro, IntroKind, OperatorHeader};

/// Surface updates derived from one snapshot, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub mode: Mode,
    /// The mode differs from the previous snapshot's.
    pub mode_changed: bool,
    /// Nothing in the transcript changes.
    pub skipped: bool,
    pub clear_transcript: bool,
    pub clear_callback_flash: bool,
    /// New title for `set_mode`, present whenever content is rebuilt.
    pub title: Option<String>,
    pub operator: Option<OperatorHeader>,
    pub intro: Option<Intro>,
    pub discarded_echoes: Vec<EchoId>,
    pub to_render: Vec<Message>,
    pub notify: bool,
    /// Id to persist as acknowledged; always ahead of the stored one.
    pub acknowledge: Option<MessageId>,
    /// The newest message is an operator's; the posting session is over.
    pub operator_replied: bool,
}

impl Reconciliation {
    fn new(mode: Mode, mode_changed: bool) -> Self {
        Self {
            mode,
            mode_changed,
            skipped: false,
            clear_transcript: false,
            clear_callback_flash: false,
            title: None,
            operator: None,
            intro: None,
            discarded_echoes: Vec::new(),
            to_render: Vec::new(),
            notify: false,
            acknowledge: None,
            operator_replied: false,
        }
    }

    /// Whether applying this plan changes the transcript at all.
    pub fn mutates_transcript(&self) -> bool {
        self.clear_transcript
            || self.intro.is_some()
            || !self.discarded_echoes.is_empty()
            || !self.to_render.is_empty()
    }
}

pub struct Reconciler {
    translations: Translations,
    default_photo_url: String,
    rendered: HashSet<MessageId>,
    last_rendered: Option<MessageId>,
    /// Echoes of successfully posted drafts, oldest first.
    pending: Vec<(EchoId, String)>,
    /// Drafts whose post failed; shown with a marker until the next success.
    failed: Vec<EchoId>,
    next_echo: EchoId,
    intro_shown: bool,
    inbound_rendered: bool,
    last_header: Option<OperatorHeader>,
    connection_lost: bool,
}

impl Reconciler {
    pub fn new(translations: Translations, default_photo_url: impl Into<String>) -> Self {
        Self {
            translations,
            default_photo_url: default_photo_url.into(),
            rendered: HashSet::new(),
            last_rendered: None,
            pending: Vec::new(),
            failed: Vec::new(),
            next_echo: 0,
            intro_shown: false,
            inbound_rendered: false,
            last_header: None,
            connection_lost: false,
        }
    }

    /// Merge `snapshot` into the transcript.
    ///
    /// `observation` is the snapshot's mode compared with the previous one,
    /// `acknowledged` the persisted read-state id. Unless `force` is set, a
    /// snapshot whose newest id is already the last rendered one is skipped.
    /// A snapshot whose newest message lacks an id is rejected before any
    /// state changes.
    pub fn reconcile(
        &mut self,
        snapshot: &ConversationSnapshot,
        observation: ModeObservation,
        force: bool,
        acknowledged: Option<MessageId>,
    ) -> Result<Reconciliation, ChatError> {
        match observation.mode() {
            Mode::Callback => Ok(self.reconcile_callback(observation)),
            Mode::Normal => self.reconcile_normal(snapshot, observation, force, acknowledged),
        }
    }

    fn reconcile_callback(&mut self, observation: ModeObservation) -> Reconciliation {
        let mut plan = Reconciliation::new(Mode::Callback, observation.is_change());
        if !observation.needs_rebuild() {
            plan.skipped = true;
            return plan;
        }

        self.reset_transcript();
        // The callback greeting takes the intro slot until an operator is back.
        self.intro_shown = true;

        plan.clear_transcript = true;
        plan.title = Some(self.translations.callback_title.clone());
        plan.intro = Some(Intro {
            kind: IntroKind::Callback,
            operator_name: String::new(),
            photo: PhotoSource::new(self.default_photo_url.clone()),
            text: self.translations.callback_intro_message.clone(),
            phone: None,
            whatsapp_link: None,
        });
        plan
    }

    fn reconcile_normal(
        &mut self,
        snapshot: &ConversationSnapshot,
        observation: ModeObservation,
        force: bool,
        acknowledged: Option<MessageId>,
    ) -> Result<Reconciliation, ChatError> {
        let newest = match snapshot.last_message() {
            Some(last) => Some(last.id.ok_or_else(|| {
                ChatError::ValidationGap("newest message in snapshot has no id".to_string())
            })?),
            None => None,
        };

        let mut plan = Reconciliation::new(Mode::Normal, observation.is_change());

        if observation.needs_rebuild() {
            if observation.is_change() {
                self.reset_transcript();
                plan.clear_transcript = true;
                plan.clear_callback_flash = true;
            }
            plan.title = Some(self.translations.chat_title.clone());
        }

        let header = self.operator_header(&snapshot.operator);
        if self.last_header.as_ref() != Some(&header) {
            self.last_header = Some(header.clone());
            plan.operator = Some(header);
        }

        if !force && self.last_rendered.is_some() && self.last_rendered == newest {
            plan.skipped = true;
            return Ok(plan);
        }

        if !self.intro_shown {
            plan.intro = Some(self.operator_intro(snapshot));
            self.intro_shown = true;
        }

        for message in &snapshot.messages {
            let Some(id) = message.id else {
                warn!(body_len = message.body.len(), "skipping snapshot message without id");
                continue;
            };
            if self.rendered.insert(id) {
                plan.to_render.push(message.clone());
            }
        }

        plan.discarded_echoes = self.supersede_echoes(&plan.to_render);
        if plan.to_render.iter().any(|m| m.direction == Direction::In) {
            self.inbound_rendered = true;
        }
        if newest.is_some() {
            self.last_rendered = newest;
        }

        if let (Some(id), Some(last)) = (newest, snapshot.last_message()) {
            let unseen = acknowledged.map_or(true, |acked| id > acked);
            if unseen {
                plan.acknowledge = Some(id);
                plan.notify = last.is_from_operator();
            }
            plan.operator_replied = last.is_from_operator();
        }

        debug!(
            rendered = plan.to_render.len(),
            discarded_echoes = plan.discarded_echoes.len(),
            notify = plan.notify,
            "snapshot reconciled"
        );
        Ok(plan)
    }

    /// Drop the pending echoes that the confirmed inbound messages in
    /// `fresh` replace: first by identical body, then oldest echo to oldest
    /// unmatched message. Echoes left over keep waiting.
    fn supersede_echoes(&mut self, fresh: &[Message]) -> Vec<EchoId> {
        let inbound: Vec<&str> = fresh
            .iter()
            .filter(|m| m.direction == Direction::In)
            .map(|m| m.body.trim())
            .collect();
        if inbound.is_empty() || self.pending.is_empty() {
            return Vec::new();
        }

        let mut claimed = vec![false; inbound.len()];
        let mut discarded = Vec::new();

        self.pending.retain(|(echo, body)| {
            let slot = (0..inbound.len()).find(|&i| !claimed[i] && inbound[i] == body.trim());
            match slot {
                Some(i) => {
                    claimed[i] = true;
                    discarded.push(*echo);
                    false
                }
                None => true,
            }
        });

        let unclaimed = claimed.iter().filter(|c| !**c).count();
        let by_order = unclaimed.min(self.pending.len());
        discarded.extend(self.pending.drain(..by_order).map(|(echo, _)| echo));

        discarded
    }

    fn operator_intro(&self, snapshot: &ConversationSnapshot) -> Intro {
        let online = &snapshot.operator;
        // The operator who started the conversation greets; with no
        // messages yet, whoever is online now.
        let (operator_name, photo) = match snapshot.messages.first() {
            Some(first) => (
                first.operator_name.clone(),
                PhotoSource::from_parts(
                    first.operator_photo_url.clone(),
                    first.operator_photo_url_alt.clone(),
                )
                .unwrap_or_else(|| self.default_photo()),
            ),
            None => (
                online.name.clone(),
                online
                    .preferred_photo()
                    .cloned()
                    .unwrap_or_else(|| self.default_photo()),
            ),
        };

        let whatsapp_link = online
            .whatsapp
            .as_deref()
            .or(online.phone.as_deref())
            .map(whatsapp_link)
            .filter(|link| link.len() > WHATSAPP_LINK_PREFIX.len());

        Intro {
            kind: IntroKind::Operator,
            operator_name,
            photo,
            text: snapshot.intro_text.clone(),
            phone: online.phone.clone(),
            whatsapp_link,
        }
    }

    fn operator_header(&self, operator: &OperatorInfo) -> OperatorHeader {
        let mut photo = operator
            .preferred_photo()
            .cloned()
            .unwrap_or_else(|| self.default_photo());
        photo.alt_url = photo.alt_or_derived();

        OperatorHeader {
            title: self.translations.chat_title.clone(),
            operator_name: operator.name.clone(),
            photo,
        }
    }

    fn default_photo(&self) -> PhotoSource {
        PhotoSource::new(self.default_photo_url.clone())
    }

    fn reset_transcript(&mut self) {
        self.rendered.clear();
        self.last_rendered = None;
        self.pending.clear();
        self.failed.clear();
        self.intro_shown = false;
        self.inbound_rendered = false;
        self.last_header = None;
    }

    /// Register the echo of a draft the backend accepted.
    pub fn push_echo(&mut self, body: &str) -> EchoId {
        let echo = self.allocate_echo();
        self.pending.push((echo, body.to_string()));
        echo
    }

    /// Register a draft whose post failed.
    pub fn push_failed(&mut self) -> EchoId {
        let echo = self.allocate_echo();
        self.failed.push(echo);
        echo
    }

    /// Failed drafts to clear after a successful post.
    pub fn take_failed(&mut self) -> Vec<EchoId> {
        std::mem::take(&mut self.failed)
    }

    fn allocate_echo(&mut self) -> EchoId {
        self.next_echo += 1;
        self.next_echo
    }

    /// Whether the visitor has anything in the transcript yet, confirmed or not.
    pub fn has_inbound(&self) -> bool {
        self.inbound_rendered || !self.pending.is_empty() || !self.failed.is_empty()
    }

    /// Returns true when the connection indicator should appear now.
    pub fn record_failure(&mut self) -> bool {
        !std::mem::replace(&mut self.connection_lost, true)
    }

    /// Returns true when the connection indicator should be removed now.
    pub fn record_success(&mut self) -> bool {
        std::mem::replace(&mut self.connection_lost, false)
    }

    pub fn connection_lost(&self) -> bool {
        self.connection_lost
    }

    pub fn last_rendered(&self) -> Option<MessageId> {
        self.last_rendered
    }

    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    pub fn pending_echoes(&self) -> usize {
        self.pending.len()
    }
}

fn whatsapp_link(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{WHATSAPP_LINK_PREFIX}{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, direction: Direction, body: &str) -> Message {
        Message {
            id: Some(MessageId(id)),
            body: body.to_string(),
            direction,
            operator_name: "Marta".to_string(),
            operator_photo_url: Some("/img/marta.jpg".to_string()),
            operator_photo_url_alt: None,
        }
    }

    fn online(messages: Vec<Message>) -> ConversationSnapshot {
        ConversationSnapshot {
            operator_online: true,
            operator: OperatorInfo {
                id: 2,
                name: "Petra".to_string(),
                photo_full: Some(PhotoSource::new("/img/petra-full.png")),
                photo: Some(PhotoSource::new("/img/petra.png")),
                phone: Some("+420 777 123 456".to_string()),
                whatsapp: None,
            },
            intro_text: "Hello, how can we help?".to_string(),
            messages,
        }
    }

    fn offline() -> ConversationSnapshot {
        ConversationSnapshot::default()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Translations::default(), "/img/default.png")
    }

    const FIRST: ModeObservation = ModeObservation::First(Mode::Normal);
    const SAME: ModeObservation = ModeObservation::Unchanged(Mode::Normal);

    #[test]
    fn empty_conversation_gets_one_intro_from_online_operator() {
        let mut r = reconciler();
        let plan = r.reconcile(&online(vec![]), FIRST, true, None).unwrap();

        let intro = plan.intro.expect("intro");
        assert_eq!(intro.kind, IntroKind::Operator);
        assert_eq!(intro.operator_name, "Petra");
        assert_eq!(intro.photo.url, "/img/petra-full.png");
        assert_eq!(intro.text, "Hello, how can we help?");
        assert_eq!(intro.whatsapp_link.as_deref(), Some("https://wa.me/420777123456"));
        assert!(plan.to_render.is_empty());
        assert!(!plan.notify);
        assert_eq!(plan.acknowledge, None);

        let again = r.reconcile(&online(vec![]), SAME, true, None).unwrap();
        assert!(again.intro.is_none());
        assert!(!again.mutates_transcript());
    }

    #[test]
    fn intro_uses_first_message_operator() {
        let mut r = reconciler();
        let plan = r
            .reconcile(&online(vec![msg(1, Direction::In, "hi")]), FIRST, true, None)
            .unwrap();
        let intro = plan.intro.unwrap();
        assert_eq!(intro.operator_name, "Marta");
        assert_eq!(intro.photo.url, "/img/marta.jpg");
        // Contact links still come from whoever is online.
        assert_eq!(intro.phone.as_deref(), Some("+420 777 123 456"));
    }

    #[test]
    fn new_operator_reply_notifies_and_advances() {
        let mut r = reconciler();
        let snapshot = online(vec![
            msg(41, Direction::In, "Is parking free?"),
            msg(42, Direction::Out, "Yes it is."),
        ]);
        let plan = r.reconcile(&snapshot, FIRST, true, Some(MessageId(41))).unwrap();

        assert_eq!(plan.to_render.len(), 2);
        assert_eq!(plan.to_render[1].id, Some(MessageId(42)));
        assert!(plan.notify);
        assert_eq!(plan.acknowledge, Some(MessageId(42)));
        assert!(plan.operator_replied);
        assert_eq!(r.last_rendered(), Some(MessageId(42)));
    }

    #[test]
    fn identical_snapshot_takes_fast_path() {
        let mut r = reconciler();
        let snapshot = online(vec![msg(5, Direction::In, "hello")]);
        let first = r.reconcile(&snapshot, FIRST, false, None).unwrap();
        assert!(first.mutates_transcript());

        let second = r.reconcile(&snapshot, SAME, false, Some(MessageId(5))).unwrap();
        assert!(second.skipped);
        assert!(!second.mutates_transcript());
        assert!(second.operator.is_none());
        assert!(second.title.is_none());
    }

    #[test]
    fn forced_redraw_is_still_idempotent() {
        let mut r = reconciler();
        let snapshot = online(vec![msg(5, Direction::In, "a"), msg(6, Direction::Out, "b")]);
        r.reconcile(&snapshot, FIRST, true, None).unwrap();
        let again = r.reconcile(&snapshot, SAME, true, Some(MessageId(6))).unwrap();

        assert!(!again.skipped);
        assert!(!again.mutates_transcript());
        assert_eq!(r.rendered_count(), 2);
    }

    #[test]
    fn notification_fires_once_per_message() {
        let mut r = reconciler();
        let mut acked = None;
        let mut notifications = 0;
        let snapshot = online(vec![msg(7, Direction::Out, "Welcome back")]);

        for i in 0..4 {
            let observation = if i == 0 { FIRST } else { SAME };
            let plan = r.reconcile(&snapshot, observation, true, acked).unwrap();
            if plan.notify {
                notifications += 1;
            }
            if let Some(id) = plan.acknowledge {
                acked = Some(id);
            }
        }
        assert_eq!(notifications, 1);
    }

    #[test]
    fn acknowledgment_never_regresses() {
        let mut r = reconciler();
        let snapshot = online(vec![msg(42, Direction::Out, "old reply")]);
        let plan = r.reconcile(&snapshot, FIRST, true, Some(MessageId(50))).unwrap();

        assert!(!plan.notify);
        assert_eq!(plan.acknowledge, None);
        assert_eq!(plan.to_render.len(), 1);
    }

    #[test]
    fn visitor_message_advances_without_notifying() {
        let mut r = reconciler();
        let plan = r
            .reconcile(&online(vec![msg(3, Direction::In, "ping")]), FIRST, true, None)
            .unwrap();
        assert!(!plan.notify);
        assert!(!plan.operator_replied);
        assert_eq!(plan.acknowledge, Some(MessageId(3)));
    }

    #[test]
    fn callback_mode_replaces_transcript_once() {
        let mut r = reconciler();
        r.reconcile(&online(vec![msg(1, Direction::In, "hi")]), FIRST, true, None)
            .unwrap();

        let to_callback = ModeObservation::Changed {
            from: Mode::Normal,
            to: Mode::Callback,
        };
        let plan = r.reconcile(&offline(), to_callback, true, None).unwrap();
        assert!(plan.mode_changed);
        assert!(plan.clear_transcript);
        assert_eq!(plan.mode, Mode::Callback);
        assert_eq!(plan.title, Some(Translations::default().callback_title));
        assert_eq!(plan.intro.unwrap().kind, IntroKind::Callback);
        assert!(!plan.notify);
        assert_eq!(r.rendered_count(), 0);

        let steady = r
            .reconcile(&offline(), ModeObservation::Unchanged(Mode::Callback), true, None)
            .unwrap();
        assert!(steady.skipped);
        assert!(!steady.mutates_transcript());
    }

    #[test]
    fn returning_to_normal_rebuilds_everything() {
        let mut r = reconciler();
        r.reconcile(&offline(), ModeObservation::First(Mode::Callback), true, None)
            .unwrap();

        let back = ModeObservation::Changed {
            from: Mode::Callback,
            to: Mode::Normal,
        };
        let snapshot = online(vec![msg(9, Direction::In, "call me")]);
        let plan = r.reconcile(&snapshot, back, false, None).unwrap();

        assert!(plan.mode_changed);
        assert!(plan.clear_transcript);
        assert!(plan.clear_callback_flash);
        assert_eq!(plan.title, Some(Translations::default().chat_title));
        assert!(plan.operator.is_some());
        assert_eq!(plan.intro.unwrap().kind, IntroKind::Operator);
        assert_eq!(plan.to_render.len(), 1);
    }

    #[test]
    fn echoes_are_superseded_by_body_then_by_order() {
        let mut r = reconciler();
        r.reconcile(&online(vec![]), FIRST, true, None).unwrap();

        let exact = r.push_echo("Do you allow dogs?");
        let sanitized = r.push_echo("Tom & Jerry");
        let waiting = r.push_echo("third");
        assert!(r.has_inbound());

        let snapshot = online(vec![
            msg(10, Direction::In, "Tom &amp; Jerry"),
            msg(11, Direction::In, "Do you allow dogs?"),
        ]);
        let plan = r.reconcile(&snapshot, SAME, true, None).unwrap();

        assert_eq!(plan.discarded_echoes, vec![exact, sanitized]);
        assert_eq!(r.pending_echoes(), 1);
        assert_eq!(plan.to_render.len(), 2);

        let later = online(vec![
            msg(10, Direction::In, "Tom &amp; Jerry"),
            msg(11, Direction::In, "Do you allow dogs?"),
            msg(12, Direction::In, "third"),
        ]);
        let plan = r.reconcile(&later, SAME, true, None).unwrap();
        assert_eq!(plan.discarded_echoes, vec![waiting]);
        assert_eq!(r.pending_echoes(), 0);
    }

    #[test]
    fn operator_messages_do_not_supersede_echoes() {
        let mut r = reconciler();
        r.reconcile(&online(vec![]), FIRST, true, None).unwrap();
        r.push_echo("question");

        let plan = r
            .reconcile(&online(vec![msg(1, Direction::Out, "question")]), SAME, true, None)
            .unwrap();
        assert!(plan.discarded_echoes.is_empty());
        assert_eq!(r.pending_echoes(), 1);
    }

    #[test]
    fn newest_without_id_is_a_validation_gap() {
        let mut r = reconciler();
        let mut draft = msg(0, Direction::Out, "no id");
        draft.id = None;
        let snapshot = online(vec![msg(1, Direction::In, "hi"), draft]);

        let err = r.reconcile(&snapshot, FIRST, true, None).unwrap_err();
        assert!(matches!(err, ChatError::ValidationGap(_)));
        assert_eq!(r.rendered_count(), 0);
        assert!(r.last_rendered().is_none());
    }

    #[test]
    fn header_prefers_full_photo_with_derived_alt() {
        let mut r = reconciler();
        let plan = r.reconcile(&online(vec![]), FIRST, true, None).unwrap();
        let header = plan.operator.unwrap();
        assert_eq!(header.operator_name, "Petra");
        assert_eq!(header.photo.url, "/img/petra-full.png");
        assert_eq!(header.photo.alt_url.as_deref(), Some("/img/petra-full.webp"));
    }

    #[test]
    fn connection_indicator_is_idempotent() {
        let mut r = reconciler();
        assert!(r.record_failure());
        assert!(!r.record_failure());
        assert!(r.connection_lost());
        assert!(r.record_success());
        assert!(!r.record_success());
    }

    #[test]
    fn failed_drafts_count_as_inbound_until_cleared() {
        let mut r = reconciler();
        assert!(!r.has_inbound());
        let failed = r.push_failed();
        assert!(r.has_inbound());
        assert_eq!(r.take_failed(), vec![failed]);
        assert!(!r.has_inbound());
    }
}
