use serenity::{
    model::{
        id::{ChannelId, GuildId, UserId},
        voice::VoiceState,
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::audio::SessionRegistry;

/// Traduce cambios de estado de voz en eventos para la sesión de la guild.
///
/// - El bot sale del canal sin que la sesión lo pidiera: `voice_dropped`.
/// - Alguien entra o sale del canal del bot: se informa la ocupación humana.
pub fn handle_voice_state_update(
    ctx: &Context,
    registry: &SessionRegistry,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };
    let Some(session) = registry.get(guild_id) else {
        return;
    };

    let bot_id = ctx.cache.current_user().id;
    if new.user_id == bot_id && new.channel_id.is_none() {
        info!("🔌 Bot desconectado en guild {}", guild_id);
        session.voice_dropped();
        return;
    }

    let Some(bot_channel) = session.status().channel else {
        return;
    };
    let touched = new.channel_id == Some(bot_channel)
        || old.and_then(|o| o.channel_id) == Some(bot_channel);
    if !touched {
        return;
    }

    if let Some(humans) = humans_in_channel(ctx, guild_id, bot_channel, bot_id) {
        debug!("👥 {} oyentes en canal {} (guild {})", humans, bot_channel, guild_id);
        session.report_occupancy(humans);
    }
}

/// Cuenta usuarios no-bot en un canal de voz usando la caché.
///
/// La referencia a la caché no debe cruzar un `.await`.
fn humans_in_channel(
    ctx: &Context,
    guild_id: GuildId,
    channel_id: ChannelId,
    bot_id: UserId,
) -> Option<usize> {
    let guild = ctx.cache.guild(guild_id)?;

    let states = guild.voice_states.values().map(|state| {
        let known_bot = state
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot))
            .or_else(|| ctx.cache.user(state.user_id).map(|u| u.bot));
        (state.channel_id, !is_listener(state.user_id, bot_id, known_bot))
    });

    Some(count_humans(states, channel_id))
}

/// Si un usuario del canal cuenta como oyente.
///
/// Sin el intent de miembros la caché no siempre conoce al usuario. Un
/// desconocido cuenta como humano, así que otro bot que la caché no haya
/// visto retrasa la auto-desconexión hasta que salga del canal.
fn is_listener(user_id: UserId, bot_id: UserId, known_bot: Option<bool>) -> bool {
    user_id != bot_id && !known_bot.unwrap_or(false)
}

fn count_humans(
    states: impl Iterator<Item = (Option<ChannelId>, bool)>,
    channel_id: ChannelId,
) -> usize {
    states
        .filter(|(channel, is_bot)| *channel == Some(channel_id) && !is_bot)
        .count()
}
