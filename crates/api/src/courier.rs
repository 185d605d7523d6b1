//! Direct-message delivery over the Discord REST API.

use crate::{
    bot::Followup,
    delivery::{Choice, Delivery, DeliveryError, Letter, MessageHandle, Messenger, Tone},
};
use alloc::{string::String, vec::Vec};
use dashmap::DashMap;
use twilight_http::{error::ErrorType, response::DeserializeBodyError, Client};
use twilight_model::{
    channel::message::{
        component::{ActionRow, Button, ButtonStyle},
        Component, MessageFlags,
    },
    id::{
        marker::{ApplicationMarker, ChannelMarker, UserMarker},
        Id,
    },
};

type UserId = Id<UserMarker>;
type ChannelId = Id<ChannelMarker>;

/// Discord caps action rows at five buttons each.
const ROW_WIDTH: usize = 5;

impl From<twilight_http::Error> for DeliveryError {
    fn from(err: twilight_http::Error) -> Self {
        let ErrorType::Response { status, .. } = err.kind() else {
            log::debug!("request failed: {err}");
            return Self::Transient;
        };
        match status.get() {
            403 => Self::Denied,
            404 => Self::Gone,
            _ => Self::Transient,
        }
    }
}

impl From<DeserializeBodyError> for DeliveryError {
    fn from(err: DeserializeBodyError) -> Self {
        log::error!("unexpected response body: {err}");
        Self::Transient
    }
}

fn rows(choices: &[Choice]) -> Vec<Component> {
    choices
        .chunks(ROW_WIDTH)
        .map(|row| {
            let components = row
                .iter()
                .map(|choice| {
                    Component::Button(Button {
                        custom_id: Some(String::from(&*choice.custom_id)),
                        disabled: false,
                        emoji: None,
                        label: Some(String::from(&*choice.label)),
                        style: match choice.tone {
                            Tone::Primary => ButtonStyle::Primary,
                            Tone::Success => ButtonStyle::Success,
                            Tone::Danger => ButtonStyle::Danger,
                        },
                        url: None,
                    })
                })
                .collect();
            Component::ActionRow(ActionRow { components })
        })
        .collect()
}

/// Sends letters as direct messages. DM channels are opened once per user.
pub struct Courier {
    client: Client,
    app: Id<ApplicationMarker>,
    channels: DashMap<UserId, ChannelId>,
}

impl Courier {
    pub fn new(token: String, app: Id<ApplicationMarker>) -> Self {
        Self { client: Client::new(token), app, channels: DashMap::new() }
    }

    async fn channel(&self, user: UserId) -> Result<ChannelId, DeliveryError> {
        if let Some(channel) = self.channels.get(&user) {
            return Ok(*channel);
        }
        let channel = self.client.create_private_channel(user).await?.model().await?.id;
        self.channels.insert(user, channel);
        Ok(channel)
    }
}

impl Messenger for Courier {
    async fn send(&self, recipient: UserId, letter: &Letter) -> Delivery {
        let channel = self.channel(recipient).await?;
        let components = rows(&letter.choices);

        let request = self.client.create_message(channel).content(&letter.content).map_err(|err| {
            log::error!("rejected message content: {err}");
            DeliveryError::Transient
        })?;
        let request = if components.is_empty() {
            request
        } else {
            request.components(&components).map_err(|err| {
                log::error!("rejected message components: {err}");
                DeliveryError::Transient
            })?
        };

        let message = request.await?.model().await?;
        Ok(MessageHandle { channel, message: message.id })
    }

    async fn delete(&self, handle: MessageHandle) -> Result<(), DeliveryError> {
        self.client.delete_message(handle.channel, handle.message).await?;
        Ok(())
    }
}

impl Followup for Courier {
    async fn follow_up(&self, token: &str, content: &str) {
        let interaction = self.client.interaction(self.app);
        let request = match interaction.create_followup(token).content(content) {
            Ok(request) => request.flags(MessageFlags::EPHEMERAL),
            Err(err) => {
                log::error!("rejected follow-up content: {err}");
                return;
            }
        };
        if let Err(err) = request.await {
            log::error!("failed to follow up on interaction: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::rows;
    use crate::delivery::{Choice, Tone};
    use twilight_model::channel::message::{component::ButtonStyle, Component};

    fn choice(i: usize) -> Choice {
        Choice { custom_id: format!("7:{i}").into(), label: format!("{i}").into(), tone: Tone::Primary }
    }

    #[test]
    fn choices_wrap_into_rows_of_five() {
        let choices: Vec<_> = (0..12).map(choice).collect();
        let rows = rows(&choices);
        let widths: Vec<_> = rows
            .iter()
            .map(|row| match row {
                Component::ActionRow(row) => row.components.len(),
                _ => panic!("expected an action row"),
            })
            .collect();
        assert_eq!(widths, [5, 5, 2]);
        assert!(super::rows(&[]).is_empty());
    }

    #[test]
    fn buttons_carry_routing_ids() {
        let mut choices = vec![choice(0)];
        choices[0].tone = Tone::Danger;
        let rows = rows(&choices);
        let Component::ActionRow(row) = &rows[0] else {
            panic!("expected an action row");
        };
        let Component::Button(button) = &row.components[0] else {
            panic!("expected a button");
        };
        assert_eq!(button.custom_id.as_deref(), Some("7:0"));
        assert_eq!(button.label.as_deref(), Some("0"));
        assert_eq!(button.style, ButtonStyle::Danger);
    }
}
