use serde::Deserialize;

/// output container, all of them can be played before the stream ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    MpegTs,
    FragmentedMp4,
    Hls,
}

impl Container {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::MpegTs => "video/mp2t",
            Self::FragmentedMp4 => "video/mp4",
            Self::Hls => "application/vnd.apple.mpegurl",
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self {
            Self::MpegTs => &["-f", "mpegts"],
            Self::FragmentedMp4 => &[
                "-f",
                "mp4",
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
            ],
            Self::Hls => &[
                "-f",
                "hls",
                "-hls_time",
                "4",
                "-hls_list_size",
                "6",
                "-hls_flags",
                "delete_segments+temp_file",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate_kbps: u32,
    pub max_rate_kbps: u32,
    pub buffer_size_kbps: u32,
    /// in frames, keep it around 2s worth so players start quickly
    pub keyframe_interval: u32,
    /// None strips audio entirely
    pub audio: Option<AudioSettings>,
    pub container: Container,
}

impl TranscodeProfile {
    /// 144p, 15fps, 40k and no audio. for really bad connections
    pub fn minimal() -> Self {
        Self {
            width: 256,
            height: 144,
            frame_rate: 15,
            video_bitrate_kbps: 40,
            max_rate_kbps: 40,
            buffer_size_kbps: 240,
            keyframe_interval: 30,
            audio: None,
            container: Container::MpegTs,
        }
    }

    /// 240p with mono audio
    pub fn low() -> Self {
        Self {
            width: 426,
            height: 240,
            frame_rate: 20,
            video_bitrate_kbps: 150,
            max_rate_kbps: 150,
            buffer_size_kbps: 600,
            keyframe_interval: 40,
            audio: Some(AudioSettings {
                channels: 1,
                sample_rate: 22050,
                bitrate_kbps: 32,
            }),
            container: Container::MpegTs,
        }
    }

    /// full ffmpeg argument list, the binary itself is not included
    ///
    /// the order matters to ffmpeg: input options, input, output options, output
    pub fn build_args(&self, source_url: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-loglevel",
            "error",
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-i",
            source_url,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        match self.audio {
            None => args.push("-an".to_string()),
            Some(audio) => args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-ac".to_string(),
                audio.channels.to_string(),
                "-ar".to_string(),
                audio.sample_rate.to_string(),
                "-b:a".to_string(),
                format!("{}k", audio.bitrate_kbps),
            ]),
        }

        args.extend([
            "-vf".to_string(),
            format!("scale={}:{}", self.width, self.height),
            "-r".to_string(),
            self.frame_rate.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-tune".to_string(),
            "zerolatency".to_string(),
            "-b:v".to_string(),
            format!("{}k", self.video_bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", self.max_rate_kbps),
            "-bufsize".to_string(),
            format!("{}k", self.buffer_size_kbps),
            "-g".to_string(),
            self.keyframe_interval.to_string(),
        ]);

        args.extend(self.container.args().iter().map(|s| s.to_string()));
        args.push("pipe:1".to_string());

        args
    }
}

impl Default for TranscodeProfile {
    fn default() -> Self {
        Self::minimal()
    }
}

/// profile names as they show up in `?profile=`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    #[default]
    Minimal,
    Low,
}

impl From<ProfileName> for TranscodeProfile {
    fn from(name: ProfileName) -> Self {
        match name {
            ProfileName::Minimal => TranscodeProfile::minimal(),
            ProfileName::Low => TranscodeProfile::low(),
        }
    }
}
