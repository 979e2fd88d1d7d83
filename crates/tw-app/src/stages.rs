//! Mesh import, user journals and the solver transcript.

use crate::error::AppResult;
use serde_json::json;
use std::path::PathBuf;
use tw_setup::StageContext;

/// Points in the pipeline where user journals run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalPoint {
    PostMeshImport,
    PreInit,
    PreSolve,
    PreExit,
}

impl JournalPoint {
    pub fn key(&self) -> &'static str {
        match self {
            JournalPoint::PostMeshImport => "postMeshImportJournalFilenames",
            JournalPoint::PreInit => "preInitJournalFilenames",
            JournalPoint::PreSolve => "preSolveJournalFilenames",
            JournalPoint::PreExit => "preExitJournalFilenames",
        }
    }
}

/// Run the journals configured for `point`; returns how many the solver accepted.
pub fn run_journals(ctx: &mut StageContext<'_>, point: JournalPoint) -> AppResult<usize> {
    let key = point.key();
    let mut ran = 0;
    for file in ctx.case.list(key) {
        let path = ctx.layout.input(&file);
        if !path.exists() {
            tracing::warn!(key, "journal {} not found", path.display());
            continue;
        }
        let args = json!({"file_name_list": [path.to_string_lossy()]});
        if ctx.driver.try_invoke("file/read_journal", args, key)?.is_some() {
            ran += 1;
        }
    }
    Ok(ran)
}

fn is_case_file(file: &str) -> bool {
    let lower = file.to_ascii_lowercase();
    [".cas", ".cas.h5", ".cas.gz"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Read the mesh (the first file; the rest are appended), the inlet and
/// outlet profiles, then check the mesh.
///
/// Returns false when the configured mesh could not be read. Without a
/// `meshFilename` the case works on whatever the solver already holds.
pub fn import_mesh(ctx: &mut StageContext<'_>) -> AppResult<bool> {
    let key = "meshFilename";
    let meshes = ctx.case.list(key);
    let Some((first, rest)) = meshes.split_first() else {
        tracing::warn!(key, case = ctx.case.name(), "no mesh configured, using the loaded one");
        return Ok(true);
    };

    let reader = if is_case_file(first) {
        "file/read_case"
    } else {
        "file/read_mesh"
    };
    let file = ctx.layout.input(first);
    tracing::info!(case = ctx.case.name(), mesh = %file.display(), "reading mesh");
    if ctx
        .driver
        .try_invoke(reader, json!({"file_name": file.to_string_lossy()}), key)?
        .is_none()
    {
        return Ok(false);
    }
    for extra in rest {
        let file = ctx.layout.input(extra);
        ctx.driver.try_invoke(
            "mesh/modify_zones/append_mesh",
            json!({"file_name": file.to_string_lossy()}),
            key,
        )?;
    }

    for profile_key in ["profileName", "profileNameOut"] {
        if let Some(profile) = ctx.case.text(profile_key) {
            let file = ctx.layout.input(&profile);
            ctx.driver.try_invoke(
                "file/read_profile",
                json!({"file_name": file.to_string_lossy()}),
                profile_key,
            )?;
        }
    }

    ctx.driver.try_invoke("mesh/check", json!({}), key)?;
    Ok(true)
}

pub fn transcript_file(ctx: &StageContext<'_>) -> PathBuf {
    ctx.layout.file(&format!("{}.trn", ctx.case.filename()))
}

pub fn start_transcript(ctx: &mut StageContext<'_>) -> AppResult<bool> {
    let file = transcript_file(ctx);
    Ok(ctx
        .driver
        .try_invoke(
            "file/start_transcript",
            json!({"file_name": file.to_string_lossy()}),
            "caseFilename",
        )?
        .is_some())
}

pub fn stop_transcript(ctx: &mut StageContext<'_>) -> AppResult<()> {
    ctx.driver
        .try_invoke("file/stop_transcript", json!({}), "caseFilename")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use tw_config::Case;
    use tw_driver::{Driver, OfflineSession};
    use tw_setup::CaseLayout;

    fn case(body: Value) -> Case {
        let body: Map<String, Value> = body.as_object().cloned().unwrap();
        Case::new("caseA", body)
    }

    #[test]
    fn case_files_are_recognized() {
        assert!(is_case_file("rotor.cas.h5"));
        assert!(is_case_file("ROTOR.CAS"));
        assert!(!is_case_file("rotor.msh.h5"));
    }

    #[test]
    fn meshes_are_read_then_appended() {
        let dir = tempfile::tempdir().unwrap();
        let session = OfflineSession::new("24.2.0");
        let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
        let mut case = case(serde_json::json!({
            "meshFilename": ["rotor.msh.h5", "stator.msh.h5"],
            "profileName": "inlet.prof"
        }));
        let layout = CaseLayout::new(dir.path(), "caseA");
        let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

        assert!(import_mesh(&mut ctx).unwrap());
        let journal = session.journal();
        assert!(journal[0].starts_with("invoke file/read_mesh"));
        assert!(journal[1].starts_with("invoke mesh/modify_zones/append_mesh"));
        assert!(journal[1].contains("stator.msh.h5"));
        assert!(journal.iter().any(|l| l.starts_with("invoke file/read_profile")));
        assert_eq!(journal.last().unwrap(), "invoke mesh/check {}");
    }

    #[test]
    fn unreadable_mesh_fails_the_import() {
        let dir = tempfile::tempdir().unwrap();
        let session = OfflineSession::new("24.2.0");
        session.fail_command("file/read_case");
        let mut driver = Driver::new(Box::new(session), false).unwrap();
        let mut case = case(serde_json::json!({"meshFilename": "rotor.cas.h5"}));
        let layout = CaseLayout::new(dir.path(), "caseA");
        let mut ctx = StageContext::new(&mut driver, &mut case, &layout);
        assert!(!import_mesh(&mut ctx).unwrap());
    }

    #[test]
    fn missing_journals_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fix.jou"), "; nothing\n").unwrap();
        let session = OfflineSession::new("24.2.0");
        let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
        let mut case = case(serde_json::json!({
            "preInitJournalFilenames": ["fix.jou", "gone.jou"]
        }));
        let layout = CaseLayout::new(dir.path(), "caseA");
        let mut ctx = StageContext::new(&mut driver, &mut case, &layout);
        assert_eq!(run_journals(&mut ctx, JournalPoint::PreInit).unwrap(), 1);
        assert_eq!(run_journals(&mut ctx, JournalPoint::PreExit).unwrap(), 0);
    }
}
