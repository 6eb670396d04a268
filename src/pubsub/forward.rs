use std::sync::Arc;

use serde::Serialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    sync::Notify,
};
use tracing::{debug, info, warn};

use super::SubscriptionChannel;

/// Причина завершения пересылки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardEnd {
    /// Получен сигнал остановки.
    Shutdown,
    /// Канал закрыт со стороны шины или через ручку закрытия.
    Closed,
    /// Транспорт перестал принимать данные.
    Disconnected,
}

/// Итог работы [`forward_subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub end: ForwardEnd,
}

/// Пересылает события подписки в транспорт построчным JSON.
///
/// Каждое событие пишется как одна строка
/// `{"topic":..,"sequence":..,"payload":..}`. Ошибка записи считается
/// разрывом соединения: цикл завершается, а канал отписывается. Событие,
/// которое не удалось сериализовать, пропускается.
///
/// Остановка по сигналу: `shutdown.notify_waiters()` или
/// `shutdown.notify_one()`.
pub async fn forward_subscription<P, W>(
    mut channel: SubscriptionChannel<P>,
    mut writer: W,
    shutdown: Arc<Notify>,
) -> ForwardStats
where
    P: Serialize,
    W: AsyncWrite + Unpin,
{
    let topic = channel.topic().clone();
    let subscriber = channel.id();
    let mut forwarded = 0u64;
    let mut line = Vec::with_capacity(256);

    let stop = shutdown.notified();
    tokio::pin!(stop);

    let end = loop {
        select! {
            _ = &mut stop => {
                debug!(topic = %topic, %subscriber, "forwarder received shutdown signal");
                break ForwardEnd::Shutdown;
            }
            res = channel.recv() => {
                let envelope = match res {
                    Ok(envelope) => envelope,
                    Err(_) => break ForwardEnd::Closed,
                };

                line.clear();
                if let Err(e) = serde_json::to_writer(&mut line, &envelope.frame()) {
                    warn!(
                        topic = %topic,
                        sequence = envelope.sequence,
                        error = %e,
                        "failed to serialize event, skipping"
                    );
                    continue;
                }
                line.push(b'\n');

                if let Err(e) = writer.write_all(&line).await {
                    warn!(topic = %topic, %subscriber, error = %e, "transport write failed");
                    break ForwardEnd::Disconnected;
                }
                if let Err(e) = writer.flush().await {
                    warn!(topic = %topic, %subscriber, error = %e, "transport flush failed");
                    break ForwardEnd::Disconnected;
                }
                forwarded += 1;
            }
        }
    };

    let dropped = channel.dropped();
    drop(channel);

    info!(
        topic = %topic,
        %subscriber,
        forwarded,
        dropped,
        end = ?end,
        "subscription forwarding finished"
    );
    ForwardStats {
        forwarded,
        dropped,
        end,
    }
}
