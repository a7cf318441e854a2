use crate::db::models::{ServiceTokenMap, User};
use crate::error::AppError;
use crate::scheduler::registry::{Action, Trigger};
use crate::spotify::SpotifyIntegration;
use crate::spotify::parser::track_uri;
use async_trait::async_trait;
use std::sync::Arc;

/// Fires while nothing is playing on the user's account
pub struct NotPlaying {
    spotify: Arc<SpotifyIntegration>,
}

impl NotPlaying {
    pub fn new(spotify: Arc<SpotifyIntegration>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl Trigger for NotPlaying {
    fn name(&self) -> &'static str {
        "spotify.not_playing"
    }

    fn description(&self) -> &'static str {
        "Nothing is playing on Spotify"
    }

    async fn check(
        &self,
        _option: &str,
        tokens: &ServiceTokenMap,
        _user: &User,
    ) -> Result<bool, AppError> {
        Ok(!self.spotify.is_playing(tokens).await?)
    }
}

/// Fires while something is playing
pub struct Playing {
    spotify: Arc<SpotifyIntegration>,
}

impl Playing {
    pub fn new(spotify: Arc<SpotifyIntegration>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl Trigger for Playing {
    fn name(&self) -> &'static str {
        "spotify.playing"
    }

    fn description(&self) -> &'static str {
        "Something is playing on Spotify"
    }

    async fn check(
        &self,
        _option: &str,
        tokens: &ServiceTokenMap,
        _user: &User,
    ) -> Result<bool, AppError> {
        self.spotify.is_playing(tokens).await
    }
}

/// Resume playback; a track link in the option starts that track instead
pub struct ResumePlayback {
    spotify: Arc<SpotifyIntegration>,
}

impl ResumePlayback {
    pub fn new(spotify: Arc<SpotifyIntegration>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl Action for ResumePlayback {
    fn name(&self) -> &'static str {
        "spotify.resume_playback"
    }

    fn description(&self) -> &'static str {
        "Resume Spotify playback, or start the track given as option"
    }

    async fn run(
        &self,
        option: &str,
        tokens: &ServiceTokenMap,
        user: &User,
    ) -> Result<String, AppError> {
        if option.trim().is_empty() {
            self.spotify.play(tokens, None).await?;
            return Ok(format!("Resumed playback for {}", user.username));
        }

        let uri = track_uri(option)
            .ok_or_else(|| AppError::unprocessable(format!("Not a Spotify track: {}", option)))?;
        self.spotify.play(tokens, Some(&uri)).await?;

        Ok(format!("Started {} for {}", uri, user.username))
    }
}

pub struct QueueTrack {
    spotify: Arc<SpotifyIntegration>,
}

impl QueueTrack {
    pub fn new(spotify: Arc<SpotifyIntegration>) -> Self {
        Self { spotify }
    }
}

#[async_trait]
impl Action for QueueTrack {
    fn name(&self) -> &'static str {
        "spotify.queue_track"
    }

    fn description(&self) -> &'static str {
        "Add the track given as option to the Spotify queue"
    }

    async fn run(
        &self,
        option: &str,
        tokens: &ServiceTokenMap,
        user: &User,
    ) -> Result<String, AppError> {
        let uri = track_uri(option)
            .ok_or_else(|| AppError::unprocessable(format!("Not a Spotify track: {}", option)))?;
        self.spotify.queue(tokens, &uri).await?;

        Ok(format!("Queued {} for {}", uri, user.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AccountType;
    use crate::spotify::tests::{fixture, tokens};

    fn user() -> User {
        User {
            id: 2,
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            password_hash: None,
            services: ServiceTokenMap::new(),
            friends: vec![],
            account_type: AccountType::Default,
        }
    }

    #[tokio::test]
    async fn test_playing_triggers_are_opposites() {
        let fx = fixture(Some(false)).await;
        let tokens = tokens(fx.service_id, "refresh-1");

        let not_playing = NotPlaying::new(fx.spotify.clone());
        let playing = Playing::new(fx.spotify.clone());

        assert!(not_playing.check("", &tokens, &user()).await.unwrap());
        assert!(!playing.check("", &tokens, &user()).await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_playback_with_and_without_track() {
        let fx = fixture(Some(false)).await;
        let tokens = tokens(fx.service_id, "refresh-1");
        let action = ResumePlayback::new(fx.spotify.clone());

        let message = action.run("", &tokens, &user()).await.unwrap();
        assert_eq!(message, "Resumed playback for bob");

        let message = action
            .run("https://open.spotify.com/track/abc123", &tokens, &user())
            .await
            .unwrap();
        assert_eq!(message, "Started spotify:track:abc123 for bob");

        assert_eq!(fx.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_queue_track_requires_a_track() {
        let fx = fixture(Some(true)).await;
        let tokens = tokens(fx.service_id, "refresh-1");
        let action = QueueTrack::new(fx.spotify.clone());

        assert!(matches!(
            action.run("no link", &tokens, &user()).await,
            Err(AppError::UnprocessableInput(_))
        ));

        let message = action.run("spotify:track:xyz", &tokens, &user()).await.unwrap();
        assert_eq!(message, "Queued spotify:track:xyz for bob");
        assert_eq!(
            fx.calls.lock().unwrap().as_slice(),
            ["QUEUE spotify:track:xyz".to_string()]
        );
    }
}
