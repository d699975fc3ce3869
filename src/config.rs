use anyhow::{Context, Result, anyhow};
use media_router::engine::Candidate;
use media_router::{Capabilities, Capability, MediaKind};
use std::net::IpAddr;
use url::Url;

/// Configuration for the SFU signaling front end.
#[derive(Debug, Clone)]
pub struct SfuConfig {
    /// Address advertised in the host candidate of every answer.
    pub public_ip: IpAddr,

    /// Port advertised in the host candidate of every answer.
    pub rtc_port: u16,

    /// Accepted audio codec names, e.g. `opus`.
    pub audio_codecs: Vec<String>,

    /// Accepted video codec names, e.g. `vp8`, `h264`.
    pub video_codecs: Vec<String>,

    /// When set, routers are created as relays of this origin instead of as origins.
    pub origin_url: Option<Url>,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            public_ip: IpAddr::from([127, 0, 0, 1]),
            rtc_port: 5000,
            audio_codecs: vec!["opus".to_string()],
            video_codecs: vec!["vp8".to_string(), "h264".to_string()],
            origin_url: None,
        }
    }
}

impl SfuConfig {
    /// Read the configuration from `SFU_*` environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SfuConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ip) = lookup("SFU_PUBLIC_IP") {
            config.public_ip = ip
                .parse()
                .with_context(|| format!("invalid SFU_PUBLIC_IP '{ip}'"))?;
        }

        if let Some(port) = lookup("SFU_RTC_PORT") {
            config.rtc_port = port
                .parse()
                .with_context(|| format!("invalid SFU_RTC_PORT '{port}'"))?;
        }

        if let Some(codecs) = lookup("SFU_AUDIO_CODECS") {
            config.audio_codecs = parse_codec_list("SFU_AUDIO_CODECS", &codecs)?;
        }

        if let Some(codecs) = lookup("SFU_VIDEO_CODECS") {
            config.video_codecs = parse_codec_list("SFU_VIDEO_CODECS", &codecs)?;
        }

        if let Some(url) = lookup("SFU_ORIGIN_URL") {
            config.origin_url = Some(
                Url::parse(&url).with_context(|| format!("invalid SFU_ORIGIN_URL '{url}'"))?,
            );
        }

        Ok(config)
    }

    /// Set the advertised address and port.
    pub fn with_public_addr(mut self, ip: IpAddr, port: u16) -> Self {
        self.public_ip = ip;
        self.rtc_port = port;
        self
    }

    /// Set the accepted audio codecs.
    pub fn with_audio_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audio_codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted video codecs.
    pub fn with_video_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.video_codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    /// Make every router a relay of `url`.
    pub fn with_origin_url(mut self, url: Url) -> Self {
        self.origin_url = Some(url);
        self
    }

    /// Whether routers created by this process are origins rather than relays.
    pub fn is_origin(&self) -> bool {
        self.origin_url.is_none()
    }

    /// The capability set handed to every router.
    pub fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::new();
        if !self.audio_codecs.is_empty() {
            capabilities = capabilities.with(
                MediaKind::Audio,
                Capability::with_codecs(self.audio_codecs.iter().cloned()),
            );
        }
        if !self.video_codecs.is_empty() {
            capabilities = capabilities.with(
                MediaKind::Video,
                Capability::with_codecs(self.video_codecs.iter().cloned()),
            );
        }
        capabilities
    }

    /// The candidates an engine should advertise.
    pub fn candidates(&self) -> Vec<Candidate> {
        vec![Candidate::host(self.public_ip, self.rtc_port)]
    }
}

fn parse_codec_list(key: &str, value: &str) -> Result<Vec<String>> {
    let codecs: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if codecs.is_empty() {
        return Err(anyhow!("{key} must list at least one codec"));
    }
    Ok(codecs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SfuConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.rtc_port, 5000);
        assert!(config.is_origin());

        let capabilities = config.capabilities();
        assert!(capabilities.get(MediaKind::Audio).unwrap().accepts("OPUS"));
        assert!(capabilities.get(MediaKind::Video).unwrap().accepts("H264"));
    }

    #[test]
    fn test_env_overrides() {
        let config = SfuConfig::from_lookup(lookup(&[
            ("SFU_PUBLIC_IP", "10.0.0.7"),
            ("SFU_RTC_PORT", "40000"),
            ("SFU_VIDEO_CODECS", " av1 , vp9 "),
            ("SFU_ORIGIN_URL", "https://origin.example/live"),
        ]))
        .unwrap();

        assert_eq!(config.public_ip, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(config.candidates()[0].port, 40000);
        assert_eq!(config.video_codecs, vec!["av1", "vp9"]);
        assert!(!config.is_origin());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(SfuConfig::from_lookup(lookup(&[("SFU_RTC_PORT", "http")])).is_err());
        assert!(SfuConfig::from_lookup(lookup(&[("SFU_PUBLIC_IP", "nowhere")])).is_err());
        assert!(SfuConfig::from_lookup(lookup(&[("SFU_AUDIO_CODECS", " , ")])).is_err());
        assert!(SfuConfig::from_lookup(lookup(&[("SFU_ORIGIN_URL", "not a url")])).is_err());
    }

    #[test]
    fn test_builder() {
        let config = SfuConfig::default()
            .with_audio_codecs(Vec::<String>::new())
            .with_video_codecs(["h264"]);

        let capabilities = config.capabilities();
        assert!(capabilities.get(MediaKind::Audio).is_none());
        assert!(!capabilities.get(MediaKind::Video).unwrap().accepts("vp8"));
    }
}
