use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use perceiver_signature::{
    Check, ClassifierConfig, PageCapture, PagePort, PerceiverError, Signature,
    SignatureClassifier, SignatureSet,
};

struct StaticPage {
    capture: PageCapture,
    captures: AtomicUsize,
}

#[async_trait]
impl PagePort for StaticPage {
    async fn current_url(&self) -> Result<String, PerceiverError> {
        Ok(self.capture.url.clone())
    }

    async fn capture(&self) -> Result<PageCapture, PerceiverError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.capture.clone())
    }

    async fn click(&self, _selector: &str, _timeout: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }

    async fn fill(&self, _: &str, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }

    async fn scroll_into_view(&self, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }

    async fn navigate(&self, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }
}

#[tokio::test]
async fn captcha_inside_nested_frame_is_detected_with_one_capture() {
    let page = StaticPage {
        capture: PageCapture::new(
            "https://mail.example.com/challenge",
            "<html><body><h1>Verify it's you</h1></body></html>",
        )
        .with_frame(PageCapture::new(
            "https://captcha.example.net/widget",
            "<div class='g-recaptcha'><span>I'm not a robot</span></div>",
        )),
        captures: AtomicUsize::new(0),
    };

    let signatures = SignatureSet::new(vec![
        Signature::new("inbox")
            .with_url("/inbox")
            .check(Check::present(".message-list", 5.0)),
        Signature::new("captcha")
            .check(Check::present(".g-recaptcha", 4.0))
            .check(Check::present("span", 1.0).with_text("NOT A ROBOT"))
            .check(Check::absent("form#login", 1.0)),
    ])
    .unwrap();
    let classifier = SignatureClassifier::new(signatures, ClassifierConfig::default());

    let result = classifier.classify_page(&page).await.unwrap();
    assert_eq!(result.name, "captcha");
    assert_eq!(result.score, 1.0);
    assert_eq!(page.captures.load(Ordering::SeqCst), 1);
    // the inbox signature never applied to this url
    assert_eq!(result.scored.len(), 1);
}

#[tokio::test]
async fn signatures_load_from_json() {
    let raw = r#"[
        {"name": "suspended", "checks": [
            {"selector": "h1", "weight": 2, "containsText": "account suspended"},
            {"selector": "form#login", "weight": 1, "shouldExist": false}
        ]}
    ]"#;
    let parsed: Vec<Signature> = serde_json::from_str(raw).unwrap();
    let classifier =
        SignatureClassifier::new(SignatureSet::new(parsed).unwrap(), ClassifierConfig::default());
    let capture = PageCapture::new(
        "https://x/blocked",
        "<h1>Your Account Suspended notice</h1>",
    );
    let result = classifier.classify_capture(&capture, &capture.url);
    assert_eq!(result.name, "suspended");
}
