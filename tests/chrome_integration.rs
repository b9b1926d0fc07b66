use browser_tasks::task::PacingOptions;
use browser_tasks::{BrowserSession, ElementState, LaunchOptions, Page, RuntimeOptions, TaskBook, TaskRuntime};
use serde_json::json;

const FORM_PAGE: &str = "data:text/html,<html><body>\
    <input name='q'>\
    <button id='cancel' class='btn'>Continue</button>\
    <button id='confirm' class='btn' onclick=\"this.textContent='Done'\">Continue</button>\
    <div id='hidden' style='display:none'>Secret</div>\
    </body></html>";

fn launch() -> BrowserSession {
    BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser")
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_find_and_inspect_elements() {
    let mut session = launch();
    session.navigate(FORM_PAGE).expect("Failed to navigate");

    let buttons = session.find_by_xpath("//button").unwrap();
    assert_eq!(buttons.len(), 2);
    assert_eq!(session.tag_name(&buttons[0]).unwrap(), "button");
    assert_eq!(session.attribute(&buttons[1], "id").unwrap().as_deref(), Some("confirm"));

    let hidden = session.find_by_id("hidden").unwrap();
    assert!(!session.state(&hidden[0], ElementState::Displayed).unwrap());
    assert!(session.is_ready().unwrap());
}

#[test]
#[ignore]
fn test_generation_changes_on_navigation() {
    let mut session = launch();
    session.navigate(FORM_PAGE).unwrap();
    let button = session.find_by_id("confirm").unwrap().remove(0);
    let before = session.generation();

    session.navigate("data:text/html,<p>other</p>").unwrap();

    assert!(session.generation() > before);
    assert!(session.text(&button).is_err());
}

#[test]
#[ignore]
fn test_screenshot_covers_whole_document() {
    let mut session = launch();
    session
        .navigate("data:text/html,<html><body style='margin:0'><div style='height:3000px'>tall</div><p id='end'>end</p></body></html>")
        .unwrap();
    let end = session.find_by_id("end").unwrap().remove(0);

    let png = session.screenshot(Some(&end)).unwrap();

    // IHDR: width and height as big-endian u32 at bytes 16..24
    let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    assert!(height >= 3000, "screenshot only {}px tall", height);
}

#[test]
#[ignore]
fn test_run_task_against_chrome() {
    let dir = tempfile::tempdir().unwrap();
    let book: TaskBook = serde_json::from_value(json!({
        "elements": {
            "search": "xpath://input[@name='q']",
            "confirm": "<button id=\"confirm\" class=\"btn\">Continue</button>"
        },
        "tasks": {
            "fill": {"actions": [
                {"name": "open_url", "args": {"url": FORM_PAGE}},
                {"name": "input_text", "target": "search", "args": {"text": "rust"}},
                {"name": "click", "target": "confirm"},
                {"name": "get_text", "target": "id:confirm"}
            ]}
        }
    }))
    .unwrap();

    let mut session = launch();
    let options = RuntimeOptions::new()
        .pacing(PacingOptions::none().key_delay(0.0, 0.05))
        .record_dir(dir.path());
    let mut runtime = TaskRuntime::new(book, options).unwrap();

    let report = runtime.execute_task(&mut session, "fill").unwrap().unwrap();

    assert_eq!(report.records.len(), 4);
    assert_eq!(report.results().last(), Some(&json!("Done")));
    assert!(dir.path().join("fill").join("action_records.jsonl").exists());
    assert!(dir.path().join("fill/iteration_0/action_2/screenshot_before_action-target_0-repeat_0.png").exists());
}
