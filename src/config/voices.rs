//! Voice metadata for the Kokoro multi-lang v1.0 model.
//!
//! Kokoro assigns speaker ids in alphabetical order of the voice names, and the
//! first letter of a name encodes its language, so the table is just the names.

/// Essential metadata for a TTS voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub name: &'static str,
    pub speaker_id: i32,
    pub language: Language,
}

/// Language family of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    AmericanEnglish,
    BritishEnglish,
    Spanish,
    French,
    Hindi,
    Italian,
    Japanese,
    PortugueseBr,
    Mandarin,
}

impl Language {
    const ALL: [Language; 9] = [
        Language::AmericanEnglish,
        Language::BritishEnglish,
        Language::Spanish,
        Language::French,
        Language::Hindi,
        Language::Italian,
        Language::Japanese,
        Language::PortugueseBr,
        Language::Mandarin,
    ];

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            'a' => Some(Language::AmericanEnglish),
            'b' => Some(Language::BritishEnglish),
            'e' => Some(Language::Spanish),
            'f' => Some(Language::French),
            'h' => Some(Language::Hindi),
            'i' => Some(Language::Italian),
            'j' => Some(Language::Japanese),
            'p' => Some(Language::PortugueseBr),
            'z' => Some(Language::Mandarin),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::AmericanEnglish => "American English",
            Language::BritishEnglish => "British English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::Hindi => "Hindi",
            Language::Italian => "Italian",
            Language::Japanese => "Japanese",
            Language::PortugueseBr => "Portuguese BR",
            Language::Mandarin => "Mandarin Chinese",
        }
    }

    pub fn espeak_code(&self) -> &'static str {
        match self {
            Language::AmericanEnglish => "en-us",
            Language::BritishEnglish => "en-gb",
            Language::Spanish => "es",
            Language::French => "fr-fr",
            Language::Hindi => "hi",
            Language::Italian => "it",
            Language::Japanese => "ja",
            Language::PortugueseBr => "pt-br",
            Language::Mandarin => "cmn",
        }
    }

    /// Whether a job's free-form language name refers to this family.
    /// "English" matches both English families; "auto" matches everything.
    pub fn accepts(&self, requested: &str) -> bool {
        let requested = requested.trim().to_lowercase();
        if requested.is_empty() || requested == "auto" {
            return true;
        }
        let name = self.name().to_lowercase();
        name.contains(&requested) || (requested == "chinese" && *self == Language::Mandarin)
    }
}

/// All voice names, sorted; the index is the Kokoro speaker id.
const VOICES: [&str; 53] = [
    "af_alloy", "af_aoede", "af_bella", "af_heart", "af_jessica", "af_kore", "af_nicole", "af_nova", "af_river", "af_sarah", "af_sky",
    "am_adam", "am_echo", "am_eric", "am_fenrir", "am_liam", "am_michael", "am_onyx", "am_puck", "am_santa",
    "bf_alice", "bf_emma", "bf_isabella", "bf_lily", "bm_daniel", "bm_fable", "bm_george", "bm_lewis",
    "ef_dora", "em_alex", "ff_siwis",
    "hf_alpha", "hf_beta", "hm_omega", "hm_psi",
    "if_sara", "im_nicola",
    "jf_alpha", "jf_gongitsune", "jf_nezumi", "jf_tebukuro", "jm_kumo",
    "pf_dora", "pm_alex", "pm_santa",
    "zf_xiaobei", "zf_xiaoni", "zf_xiaoxiao", "zf_xiaoyi", "zm_yunjian", "zm_yunxi", "zm_yunxia", "zm_yunyang",
];

/// Get voice metadata by name using binary search.
pub fn get_voice(name: &str) -> Option<Voice> {
    let idx = VOICES.binary_search(&name).ok()?;
    let language = name.chars().next().and_then(Language::from_prefix)?;
    Some(Voice { name: VOICES[idx], speaker_id: idx as i32, language })
}

fn voices_of(language: Language) -> impl Iterator<Item = Voice> {
    VOICES.iter().filter_map(|name| get_voice(name)).filter(move |v| v.language == language)
}

/// Print all available voices grouped by language.
pub fn print_voices() {
    println!("Kokoro TTS v1.0 - {} voices across {} languages", VOICES.len(), Language::ALL.len());

    for language in Language::ALL {
        let voices: Vec<Voice> = voices_of(language).collect();

        println!("\n── {} ({} voices) ──", language.name(), voices.len());
        println!("{:<15} {:<4} ESPEAK", "VOICE", "ID");
        println!("{}", "─".repeat(50));

        for voice in voices {
            println!("{:<15} {:<4} {}", voice.name, voice.speaker_id, language.espeak_code());
        }
    }

    println!();
    println!("Use a voice as the job's \"speaker\", or as the default:");
    println!("  tts-worker --backend kokoro --default-speaker bf_emma --default-language English queue");
}

/// Print detailed information about a specific voice.
pub fn print_voice_info(name: &str) -> anyhow::Result<()> {
    let voice = get_voice(name).ok_or_else(|| anyhow::anyhow!("Voice '{}' not found. Run 'tts-worker voices' to see available voices", name))?;

    println!();
    println!("Voice: {}", voice.name);
    println!("{}", "─".repeat(40));
    println!("Speaker ID:    {}", voice.speaker_id);
    println!("Language:      {}", voice.language.name());
    println!("espeak code:   {}", voice.language.espeak_code());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(VOICES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_speaker_ids() {
        assert_eq!(get_voice("af_bella").unwrap().speaker_id, 2);
        assert_eq!(get_voice("bf_emma").unwrap().speaker_id, 21);
        assert_eq!(get_voice("zm_yunyang").unwrap().speaker_id, 52);
        assert!(get_voice("Sohee").is_none());
    }

    #[test]
    fn test_language_matching() {
        let bella = get_voice("af_bella").unwrap();
        assert_eq!(bella.language, Language::AmericanEnglish);
        assert!(bella.language.accepts("English"));
        assert!(bella.language.accepts("auto"));
        assert!(!bella.language.accepts("Korean"));
        assert!(get_voice("zf_xiaoxiao").unwrap().language.accepts("Chinese"));
        assert_eq!(voices_of(Language::Italian).count(), 2);
    }
}
