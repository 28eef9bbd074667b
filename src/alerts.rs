//! Multi-channel alert fan-out
//!
//! A critical reading produces one [`Alert`]. The [`AlertFanout`] renders it
//! per channel and hands it to every configured [`ChannelDispatcher`] at
//! once. Channels never wait on or escalate to each other: a channel that
//! exhausts its providers only affects its own report entry.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::config::{AlertsConfig, ContactsConfig, ProviderConfig};
use crate::events::{ActuatorEvent, Alert, OwnerContact};
use crate::notify::dispatcher::{ChannelDispatcher, ChannelReport, ChannelStatus};
use crate::notify::{Channel, Notification, build_provider};
use crate::util::strip_markup;

pub const EMAIL_SUBJECT: &str = "🚨 ALERTA CRÍTICA - EasyGrow";

const ACTUATOR_SUBJECT: &str = "Evento de actuador - EasyGrow";

/// Collected results of one fan-out
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutReport {
    pub device_id: String,
    pub channels: Vec<ChannelReport>,
}

impl FanoutReport {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelReport> {
        self.channels.iter().find(|report| report.channel == channel)
    }

    pub fn delivered(&self) -> Vec<Channel> {
        self.channels_where(|status| matches!(status, ChannelStatus::Delivered { .. }))
    }

    pub fn exhausted(&self) -> Vec<Channel> {
        self.channels_where(|status| *status == ChannelStatus::Exhausted)
    }

    pub fn skipped(&self) -> Vec<Channel> {
        self.channels_where(|status| *status == ChannelStatus::Skipped)
    }

    fn channels_where(&self, predicate: impl Fn(&ChannelStatus) -> bool) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|report| predicate(&report.status))
            .map(|report| report.channel)
            .collect()
    }
}

pub struct AlertFanout {
    dispatchers: Vec<ChannelDispatcher>,
}

impl AlertFanout {
    /// Channels without providers are left out of the fan-out
    pub fn new(dispatchers: Vec<ChannelDispatcher>) -> Self {
        Self { dispatchers }
    }

    pub fn from_config(alerts: &AlertsConfig, contacts: &ContactsConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(alerts.provider_timeout_secs);
        let channels = &alerts.channels;

        let configured: [(Channel, &Vec<ProviderConfig>); 4] = [
            (Channel::ChatBot, &channels.chat_bot),
            (Channel::Email, &channels.email),
            (Channel::Sms, &channels.sms),
            (Channel::VoiceMessage, &channels.voice_message),
        ];

        let mut dispatchers = Vec::new();
        for (channel, providers) in configured {
            if providers.is_empty() {
                warn!("no providers configured for channel {channel}");
                continue;
            }

            let providers = providers
                .iter()
                .map(|provider| build_provider(provider, contacts))
                .collect::<anyhow::Result<Vec<_>>>()?;

            dispatchers.push(ChannelDispatcher::new(channel, providers, timeout));
        }

        Ok(Self::new(dispatchers))
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.dispatchers.iter().map(ChannelDispatcher::channel).collect()
    }

    /// Providers of every channel, in fallback order
    pub fn provider_chains(&self) -> Vec<(Channel, Vec<&str>)> {
        self.dispatchers
            .iter()
            .map(|dispatcher| (dispatcher.channel(), dispatcher.provider_names()))
            .collect()
    }

    /// Alert text as the given channel expects it
    pub fn render(channel: Channel, alert: &Alert) -> Notification {
        match channel {
            Channel::ChatBot => Notification {
                subject: EMAIL_SUBJECT.to_string(),
                body: alert.message.clone(),
            },
            Channel::Email => Notification {
                subject: EMAIL_SUBJECT.to_string(),
                body: format!(
                    "Hola,\n\n\
                     Se ha detectado una alerta crítica en tu sistema EasyGrow:\n\n\
                     🔸 Dispositivo: {}\n\
                     🔸 Sensor: {}\n\
                     🔸 Valor registrado: {:.2}\n\
                     🔸 Hora: {}\n\n\
                     Por favor, revisa tu sistema inmediatamente.\n\n\
                     Saludos,\n\
                     Equipo EasyGrow\n",
                    alert.device_id,
                    alert.sensor,
                    alert.value,
                    alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                ),
            },
            Channel::Sms | Channel::VoiceMessage => Notification {
                subject: String::new(),
                body: strip_markup(&alert.message),
            },
        }
    }

    /// Run every channel concurrently and collect their reports
    #[instrument(skip(self, contact, alert), fields(device = %alert.device_id))]
    pub async fn dispatch(&self, contact: &OwnerContact, alert: &Alert) -> FanoutReport {
        let channels = self.dispatchers.iter().map(|dispatcher| async move {
            let channel = dispatcher.channel();
            match channel.destination(contact) {
                Some(destination) => {
                    let notification = Self::render(channel, alert);
                    dispatcher.dispatch(&destination, &notification).await
                }
                None => {
                    info!("skipping {channel}, owner has no address for it");
                    ChannelReport::skipped(channel)
                }
            }
        });

        FanoutReport {
            device_id: alert.device_id.clone(),
            channels: join_all(channels).await,
        }
    }

    /// Fan the alert out on a detached task
    pub fn spawn(self: &Arc<Self>, contact: OwnerContact, alert: Alert) -> JoinHandle<FanoutReport> {
        let fanout = Arc::clone(self);
        let span = info_span!("alert_fanout", device = %alert.device_id, sensor = %alert.sensor);

        tokio::spawn(
            async move {
                let report = fanout.dispatch(&contact, &alert).await;
                log_report(&report);
                report
            }
            .instrument(span),
        )
    }

    /// Informational notice for an actuator event, chat bot only
    pub fn spawn_actuator_notice(
        self: &Arc<Self>,
        contact: OwnerContact,
        event: ActuatorEvent,
    ) -> Option<JoinHandle<ChannelReport>> {
        let dispatcher = self
            .dispatchers
            .iter()
            .find(|dispatcher| dispatcher.channel() == Channel::ChatBot)?
            .clone();
        let destination = Channel::ChatBot.destination(&contact)?;
        let notification = actuator_notice(&event);
        let span = info_span!("actuator_notice", device = %event.mac_address);

        Some(tokio::spawn(
            async move {
                let report = dispatcher.dispatch(&destination, &notification).await;
                if report.is_delivered() {
                    info!("actuator notice delivered");
                } else {
                    warn!("actuator notice could not be delivered");
                }
                report
            }
            .instrument(span),
        ))
    }
}

pub fn actuator_notice(event: &ActuatorEvent) -> Notification {
    let mut body = format!(
        "🚰 <b>{}</b>\n📍 <b>Dispositivo:</b> {}",
        event.evento, event.mac_address
    );
    if let Some(bomba) = &event.bomba {
        body.push_str(&format!("\n🔧 <b>Bomba:</b> {bomba}"));
    }
    if let Some(humedad) = event.valor_humedad {
        body.push_str(&format!("\n💧 <b>Humedad:</b> {humedad:.2}"));
    }
    if let Some(segundos) = event.tiempo_encendida_seg {
        body.push_str(&format!("\n⏱️ <b>Tiempo encendida:</b> {segundos:.0} s"));
    }

    Notification {
        subject: ACTUATOR_SUBJECT.to_string(),
        body,
    }
}

fn log_report(report: &FanoutReport) {
    let exhausted = report.exhausted();
    if exhausted.is_empty() {
        info!(
            "alert fan-out finished, delivered on {:?}, skipped {:?}",
            report.delivered(),
            report.skipped()
        );
    } else {
        error!(
            "alert fan-out finished with exhausted channels {:?}, delivered on {:?}",
            exhausted,
            report.delivered()
        );
    }
}
