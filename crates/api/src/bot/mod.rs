mod error;

use crate::{
    capture::{Receipt, Submission},
    ledger::Ledger,
    library::QuizSource,
    session::{self, Coordinator, Player, Terminal},
};
use alloc::{collections::BTreeSet, format, string::String, sync::Arc, vec::Vec};
use core::{fmt::Write, future::Future, num::NonZeroU64};
use model::Standing;
use twilight_model::{
    application::interaction::{
        application_command::{CommandData, CommandDataOption, CommandOptionValue},
        Interaction, InteractionData, InteractionType,
    },
    channel::message::{
        embed::{Embed, EmbedField},
        MessageFlags,
    },
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{marker::UserMarker, Id},
    user::User,
};

type UserId = Id<UserMarker>;

const DMS_CLOSED: &str = "📪 I couldn't send you a direct message. Allow DMs from server members and try again.";

/// Late replies to an interaction that has already been acknowledged.
pub trait Followup: Send + Sync + 'static {
    fn follow_up(&self, token: &str, content: &str) -> impl Future<Output = ()> + Send;
}

fn ephemeral(content: String) -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::ChannelMessageWithSource,
        data: Some(InteractionResponseData {
            content: Some(content),
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }),
    }
}

/// Extracts the `name` option shared by the quiz-specific commands.
fn quiz_name(options: &[CommandDataOption]) -> error::Result<&str> {
    let option = options.first().ok_or(error::Error::InvalidParams)?;
    let CommandDataOption { name, value: CommandOptionValue::String(value) } = option else {
        return Err(error::Error::InvalidParams);
    };
    if name.as_str() != "name" {
        return Err(error::Error::UnknownCommandName);
    }
    Ok(value.as_str())
}

fn render_standings(quiz: &str, standings: &[Standing]) -> String {
    let mut content = format!("🏆 **Top results for {quiz}**");
    for (standing, rank) in standings.iter().zip(1..) {
        let _ = write!(content, "\n{rank}. {}: {} points", standing.name, standing.score);
    }
    content
}

/// Answers a button click. Accepted clicks replace the prompt with its receipt and drop the buttons.
fn settle(receipt: Receipt) -> error::Result<InteractionResponse> {
    match receipt {
        (Submission::Accepted, content) => Ok(InteractionResponse {
            kind: InteractionResponseType::UpdateMessage,
            data: Some(InteractionResponseData {
                content: content.map(String::from),
                components: Some(Vec::new()),
                ..Default::default()
            }),
        }),
        (Submission::NotOwner, _) => Err(error::Error::NotOwner),
        (Submission::Invalid, _) => Err(error::Error::InvalidChoice),
        (Submission::Expired, _) => Err(error::Error::Expired),
    }
}

pub struct Bot<L, S, F> {
    coordinator: Arc<Coordinator<L, S>>,
    followup: Arc<F>,
    admins: BTreeSet<UserId>,
}

impl<L: Ledger, S: QuizSource, F: Followup> Bot<L, S, F> {
    pub fn new(
        coordinator: Arc<Coordinator<L, S>>,
        followup: Arc<F>,
        admins: impl IntoIterator<Item = NonZeroU64>,
    ) -> Self {
        Self { coordinator, followup, admins: admins.into_iter().map(Id::from).collect() }
    }

    pub async fn on_message(&self, interaction: Interaction) -> InteractionResponse {
        let result = match interaction.kind {
            InteractionType::Ping => Ok(InteractionResponse { kind: InteractionResponseType::Pong, data: None }),
            InteractionType::ApplicationCommand => self.on_app_command(interaction).await,
            InteractionType::MessageComponent => self.on_msg_component(interaction),
            _ => Err(error::Error::UnsupportedInteraction),
        };

        use alloc::string::ToString;
        match result {
            Ok(res) => res,
            Err(err) => ephemeral(err.to_string()),
        }
    }

    async fn on_app_command(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let user =
            interaction.member.and_then(|member| member.user).xor(interaction.user).ok_or(error::Error::UnknownUser)?;
        let data = interaction.data.ok_or(error::Error::Fatal)?;
        let InteractionData::ApplicationCommand(data) = data else {
            return Err(error::Error::Fatal);
        };

        let CommandData { name, options, .. } = *data;
        match name.as_str() {
            "quiz" => {
                let player = Player { id: user.id, name: user.name.into_boxed_str() };
                self.on_quiz_command(player, &options, interaction.token).await
            }
            "quizzes" => Ok(self.on_quizzes_command()),
            "ranking" => self.on_ranking_command(&options).await,
            "toggle" => self.on_toggle_command(user.id, &options),
            "help" => Ok(Self::on_help_command()),
            _ => Err(error::Error::UnknownCommandName),
        }
    }

    async fn on_quiz_command(
        &self,
        player: Player,
        options: &[CommandDataOption],
        token: String,
    ) -> error::Result<InteractionResponse> {
        let quiz = quiz_name(options)?;
        let uid = player.id;
        let pending = self.coordinator.prepare(player, quiz).await?;

        let position = pending.position();
        let coordinator = Arc::clone(&self.coordinator);
        let followup = Arc::clone(&self.followup);
        tokio::spawn(async move {
            let quiz = String::from(pending.quiz_id());
            match coordinator.run(pending).await {
                Terminal::Completed { score } => log::debug!("session of user {uid} on {quiz} scored {score}"),
                Terminal::DeliveryDenied => {
                    log::info!("user {uid} does not accept direct messages");
                    followup.follow_up(&token, DMS_CLOSED).await;
                }
                other => log::debug!("session of user {uid} on {quiz} ended with {other:?}"),
            }
        });

        let content = if position.get() > 1 {
            format!("📬 You are **#{position}** in line for **{quiz}**. Check your DMs!")
        } else {
            format!("📬 Check your DMs to begin **{quiz}**!")
        };
        Ok(ephemeral(content))
    }

    fn on_quizzes_command(&self) -> InteractionResponse {
        let ids = self.coordinator.library().ids();
        if ids.is_empty() {
            return ephemeral(String::from("There are no quizzes available right now."));
        }

        let mut content = String::from("**Available quizzes:**");
        for id in ids {
            let status = if self.coordinator.admission().is_active(&id) { "" } else { " (inactive)" };
            let _ = write!(content, "\n- `{id}`{status}");
        }
        ephemeral(content)
    }

    async fn on_ranking_command(&self, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let quiz = quiz_name(options)?;
        let standings = self.coordinator.leaderboard(quiz).await?;
        if standings.is_empty() {
            return Ok(ephemeral(format!("Nobody has completed **{quiz}** yet.")));
        }

        Ok(ephemeral(render_standings(quiz, &standings)))
    }

    fn on_toggle_command(&self, uid: UserId, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        if !self.admins.contains(&uid) {
            log::warn!("user {uid} attempted to toggle a quiz");
            return Err(error::Error::Forbidden);
        }

        let [
            CommandDataOption { name: quiz_arg, value: CommandOptionValue::String(quiz) },
            CommandDataOption { name: active_arg, value: CommandOptionValue::Boolean(active) },
        ] = options else {
            return Err(error::Error::InvalidParams);
        };

        if quiz_arg.as_str() != "name" || active_arg.as_str() != "active" {
            return Err(error::Error::UnknownCommandName);
        }

        if self.coordinator.library().load(quiz).is_none() {
            return Err(crate::error::Error::UnknownQuiz.into());
        }

        self.coordinator.toggle_quiz_active(quiz, *active);
        let state = if *active { "now accepting" } else { "no longer accepting" };
        Ok(ephemeral(format!("Quiz **{quiz}** is {state} new players.")))
    }

    fn on_help_command() -> InteractionResponse {
        let fields = [
            ("/quiz `name`", "Take a quiz in your direct messages."),
            ("/quizzes", "List the available quizzes."),
            ("/ranking `name`", "Show the best scores of a quiz."),
            ("/toggle `name` `active`", "Open or close a quiz to new players (administrators only)."),
            ("/help", "Summon this help menu!"),
        ]
        .into_iter()
        .map(|(name, value)| EmbedField { inline: false, name: String::from(name), value: String::from(value) })
        .collect();

        InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                embeds: Some(alloc::vec![Embed {
                    fields,
                    kind: String::from("rich"),
                    color: Some(0x236EA5),
                    title: Some(String::from("Victorinus Help")),
                    description: Some(String::from("Answer quickly: correct answers lose points while you think.")),
                    author: None,
                    footer: None,
                    image: None,
                    provider: None,
                    thumbnail: None,
                    timestamp: None,
                    url: None,
                    video: None,
                }]),
                flags: Some(MessageFlags::EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    fn on_msg_component(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let User { id, .. } =
            interaction.member.and_then(|member| member.user).xor(interaction.user).ok_or(error::Error::UnknownUser)?;
        let data = interaction.data.ok_or(error::Error::Fatal)?;
        let InteractionData::MessageComponent(data) = data else {
            return Err(error::Error::Fatal);
        };

        let message = interaction.message.ok_or(error::Error::Fatal)?.id;
        let (key, choice) = session::parse_choice_id(&data.custom_id).ok_or(error::Error::InvalidParams)?;
        settle(self.coordinator.submit(key, message, id, choice))
    }
}

#[cfg(test)]
mod tests {
    use super::{error::Error, quiz_name, settle, Bot, DMS_CLOSED};
    use crate::{
        capture::Submission,
        ledger::Ledger,
        library::Library,
        session::{Coordinator, Player},
        settings::Settings,
        testing::{MemoryLedger, Outbox},
    };
    use core::time::Duration;
    use model::{Question, Quiz};
    use std::sync::Arc;
    use tokio::time;
    use twilight_model::{
        application::interaction::application_command::{CommandDataOption, CommandOptionValue},
        http::interaction::InteractionResponseType,
        id::Id,
    };

    fn option(name: &str, value: CommandOptionValue) -> CommandDataOption {
        CommandDataOption { name: name.into(), value }
    }

    fn quiz() -> Quiz {
        let question = Question {
            question: String::from("2 + 2?"),
            options: ["3", "4"].map(String::from).to_vec(),
            answer_index: 1,
            timeout: 20,
        };
        Quiz { attempts: 3, show_feedback: false, auto_delete: false, questions: vec![question] }
    }

    fn bot() -> (Bot<MemoryLedger, Library, Outbox>, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        let library = Library::from_iter([("math", quiz()), ("art", quiz())]);
        let coordinator = Coordinator::new(Arc::clone(&outbox), MemoryLedger::default(), library, Settings::default());
        (Bot::new(Arc::new(coordinator), Arc::clone(&outbox), core::iter::empty()), outbox)
    }

    fn content(reply: twilight_model::http::interaction::InteractionResponse) -> Option<String> {
        reply.data.and_then(|data| data.content)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ranking_lists_best_scores_first() {
        let (bot, _) = bot();
        let ledger = bot.coordinator.ledger();
        for (id, name, score) in [(1, "alice", 80), (2, "bob", 95), (1, "alice", 90)] {
            let player = Player { id: Id::new(id), name: name.into() };
            ledger.save_final(&player, "math", score).await.unwrap();
        }

        let options = [option("name", CommandOptionValue::String("math".into()))];
        let reply = bot.on_ranking_command(&options).await.unwrap();
        assert_eq!(
            content(reply).as_deref(),
            Some("🏆 **Top results for math**\n1. bob: 95 points\n2. alice: 90 points")
        );

        let options = [option("name", CommandOptionValue::String("art".into()))];
        let reply = bot.on_ranking_command(&options).await.unwrap();
        assert_eq!(content(reply).as_deref(), Some("Nobody has completed **art** yet."));

        let options = [option("name", CommandOptionValue::String("history".into()))];
        let err = bot.on_ranking_command(&options).await.err();
        assert!(matches!(err, Some(Error::Refused(crate::error::Error::UnknownQuiz))));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn closed_dms_get_a_follow_up() {
        let (bot, outbox) = bot();
        let alice = Player { id: Id::new(1), name: "alice".into() };
        outbox.deny(alice.id);

        let options = [option("name", CommandOptionValue::String("math".into()))];
        let reply = bot.on_quiz_command(alice, &options, String::from("token-1")).await.unwrap();
        assert_eq!(content(reply).as_deref(), Some("📬 Check your DMs to begin **math**!"));
        assert!(outbox.followups().is_empty());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(outbox.followups(), [(Box::<str>::from("token-1"), Box::<str>::from(DMS_CLOSED))]);
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn accepted_clicks_replace_the_prompt() {
        let reply = settle((Submission::Accepted, Some(Box::from("✅ Let's begin!")))).unwrap();
        assert_eq!(reply.kind, InteractionResponseType::UpdateMessage);
        let data = reply.data.unwrap();
        assert_eq!(data.content.as_deref(), Some("✅ Let's begin!"));
        assert_eq!(data.components, Some(Vec::new()));

        // Question prompts keep their text
        let data = settle((Submission::Accepted, None)).unwrap().data.unwrap();
        assert_eq!(data.content, None);
        assert_eq!(data.components, Some(Vec::new()));

        assert!(matches!(settle((Submission::Expired, None)), Err(Error::Expired)));
        assert!(matches!(settle((Submission::NotOwner, None)), Err(Error::NotOwner)));
        assert!(matches!(settle((Submission::Invalid, None)), Err(Error::InvalidChoice)));
    }

    #[test]
    fn quiz_name_requires_a_string_option() {
        let options = [option("name", CommandOptionValue::String("math".into()))];
        assert_eq!(quiz_name(&options).unwrap(), "math");
        assert!(matches!(quiz_name(&[]), Err(Error::InvalidParams)));

        let options = [option("name", CommandOptionValue::Boolean(true))];
        assert!(matches!(quiz_name(&options), Err(Error::InvalidParams)));

        let options = [option("quiz", CommandOptionValue::String("math".into()))];
        assert!(matches!(quiz_name(&options), Err(Error::UnknownCommandName)));
    }

    #[test]
    fn refusals_keep_their_message() {
        use alloc::string::ToString;
        let err = Error::from(crate::error::Error::AttemptsExhausted);
        assert_eq!(err.to_string(), crate::error::Error::AttemptsExhausted.to_string());
    }
}
