use anyhow::{Context, Result};
use rune_dom::{Document, StyleSheet};

const PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <style>
      /* entrance */
      @keyframes fade { from { opacity: 0 } to { opacity: 1 } }
      @media (prefers-reduced-motion: reduce) {
        .hero { animation: none }
      }
      .hero.is-animating { animation: fade 200ms ease-out both }
      main > .badge { animation: rise 100ms, glow 300ms }
    </style>
  </head>
  <body>
    <main id="hero" class="hero is-animating">
      <span id="badge" class="badge animate-nested">new</span>
    </main>
    <div id="slot"></div>
  </body>
</html>"#;

#[test]
fn resolves_page_animations() -> Result<()> {
    let doc = Document::parse_html(PAGE);
    let sheet = StyleSheet::from_document(&doc);
    let hero = doc.find_by_id("hero").context("missing #hero")?;
    let badge = doc.find_by_id("badge").context("missing #badge")?;

    let computed = sheet.compute_animation(&doc, hero)?;
    assert_eq!(computed.animation_name, "fade");
    assert_eq!(computed.animation_duration, "200ms");

    let computed = sheet.compute_animation(&doc, badge)?;
    assert_eq!(computed.names(), vec!["rise", "glow"]);
    assert_eq!(computed.durations(), vec!["100ms", "300ms"]);
    assert!(sheet.has_keyframes("fade"));
    assert!(!sheet.has_keyframes("rise"));
    Ok(())
}

#[test]
fn removing_the_marker_class_changes_the_cascade() -> Result<()> {
    let mut doc = Document::parse_html(PAGE);
    let sheet = StyleSheet::from_document(&doc);
    let hero = doc.find_by_id("hero").context("missing #hero")?;

    assert!(doc.remove_class(hero, "is-animating")?);
    assert_eq!(sheet.compute_animation(&doc, hero)?.animation_name, "none");
    assert_eq!(doc.describe(hero), "main#hero.hero");
    Ok(())
}

#[test]
fn inserted_fragments_are_styled_in_place() -> Result<()> {
    let mut doc = Document::parse_html(PAGE);
    let sheet = StyleSheet::from_document(&doc);
    let slot = doc.find_by_id("slot").context("missing #slot")?;

    let inserted = doc.insert_html(
        slot,
        r#"<main class="hero is-animating"><b class="badge">x</b></main>"#,
    )?;
    assert_eq!(inserted.len(), 1);
    let main = inserted[0];
    assert!(doc.is_attached(main));
    assert_eq!(doc.parent(main), Some(slot));
    assert_eq!(sheet.compute_animation(&doc, main)?.animation_name, "fade");

    let badge = doc
        .element_descendants(main)
        .next()
        .context("badge not copied")?;
    assert_eq!(
        sheet.compute_animation(&doc, badge)?.animation_name,
        "rise, glow"
    );
    Ok(())
}
