//! Email content selected by the flag decision.

use serde::Serialize;

const PREMIUM_SUBJECT: &str = "✨ Exclusive Offer Just for You, Premium Member! ✨";
const PREMIUM_HTML: &str = "<h1>Hey, Premium Member! 🌟</h1>\n\
<p>As a valued premium member, we're thrilled to bring you an exclusive offer. \
Enjoy <strong>20% off</strong> on your next purchase!</p>\n\
<p>Use the code <strong>PREMIUM20</strong> at checkout to claim your discount. 🎁</p>\n\
<p>Thank you for being a part of our premium family. We appreciate you! 💖</p>\n";
const PREMIUM_TEXT: &str = "Hey, Premium Member!\n\n\
As a valued premium member, we're thrilled to bring you an exclusive offer. \
Enjoy 20% off on your next purchase!\n\n\
Use the code PREMIUM20 at checkout to claim your discount.\n\n\
Thank you for being a part of our premium family. We appreciate you!\n";

const STANDARD_SUBJECT: &str = "👀 Peek Inside – We’ve Got Something New! 👀";
const STANDARD_HTML: &str = "<h1>Hello, Wonderful You! 🌟</h1>\n\
<p>Check out the latest updates. 🧐</p>\n";
const STANDARD_TEXT: &str = "Hello, Wonderful You!\n\nCheck out the latest updates.\n";

/// Subject and bodies of one outgoing email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmailContent {
    pub subject: &'static str,
    pub body_html: &'static str,
    pub body_text: &'static str,
}

impl EmailContent {
    /// The premium offer, sent when the flag resolves to `true`.
    pub const PREMIUM: Self = Self {
        subject: PREMIUM_SUBJECT,
        body_html: PREMIUM_HTML,
        body_text: PREMIUM_TEXT,
    };

    /// The general update, sent when the flag resolves to `false`.
    pub const STANDARD: Self = Self {
        subject: STANDARD_SUBJECT,
        body_html: STANDARD_HTML,
        body_text: STANDARD_TEXT,
    };

    /// Content for a flag value. Depends on nothing else.
    #[must_use]
    pub const fn for_decision(show_premium: bool) -> Self {
        if show_premium {
            Self::PREMIUM
        } else {
            Self::STANDARD
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_deterministic() {
        for value in [true, false] {
            assert_eq!(EmailContent::for_decision(value), EmailContent::for_decision(value));
        }
    }

    #[test]
    fn test_variants_are_distinct() {
        let premium = EmailContent::for_decision(true);
        let standard = EmailContent::for_decision(false);

        assert_ne!(premium, standard);
        assert_ne!(premium.subject, standard.subject);
        assert_ne!(premium.body_html, standard.body_html);
    }

    #[test]
    fn test_subjects() {
        assert!(EmailContent::for_decision(true).subject.contains("Premium Member!"));
        assert!(EmailContent::for_decision(false).subject.contains("Something New!"));
        assert!(EmailContent::PREMIUM.body_html.contains("PREMIUM20"));
        assert!(EmailContent::PREMIUM.body_text.contains("PREMIUM20"));
    }
}
