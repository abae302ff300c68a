//
// scu.rs
// Report-Tools-rs
//
// C-STORE service class user used to deliver synthesized containers to PACS
// nodes. One association per push job; every file is sent as its own C-STORE
// and the response status is checked before moving on.
//
// Report-Tools-rs maintainers - October 2026

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::encoding::TransferSyntaxIndex;
use dicom::object::{open_file, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom_ul::association::client::{ClientAssociation, ClientAssociationOptions};
use dicom_ul::pdu::{PDataValueType, Pdu, PresentationContextResult, PresentationContextResultReason};
use tracing::{debug, info, warn};

use crate::push::{PushJob, Pusher};

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const C_STORE_RQ: u16 = 0x0001;
const DATASET_PRESENT: u16 = 0x0000;
const PRIORITY_MEDIUM: u16 = 0x0000;

/// Pushes files over the DICOM upper layer protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreScu;

impl StoreScu {
    pub fn new() -> Self {
        StoreScu
    }
}

impl Pusher for StoreScu {
    fn push(&self, job: &PushJob<'_>) -> Result<()> {
        if job.files.is_empty() {
            return Ok(());
        }
        let addr = job.target.address();
        debug!(
            node = %job.target,
            medium_type = %job.settings.medium_type,
            custom_film_format = job.settings.custom_film_format,
            "opening association"
        );

        let sop_classes = collect_sop_classes(job.files)?;
        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(job.calling_ae.to_string())
            .called_ae_title(job.target.server_ae.clone());
        for sop_class in &sop_classes {
            options = options.with_abstract_syntax(sop_class.clone());
        }
        let mut association = options
            .establish(addr.as_str())
            .with_context(|| format!("Failed to establish association with {}", job.target))?;

        // Unvalidated nodes answer with vendor statuses we accept as-is.
        let lenient = job
            .settings
            .unvalidated_ae_titles
            .iter()
            .any(|ae| ae == &job.target.server_ae);

        let mut result = Ok(());
        for (idx, file) in job.files.iter().enumerate() {
            let message_id = u16::try_from(idx + 1).unwrap_or(u16::MAX);
            if let Err(e) = store_file(&mut association, file, &sop_classes, job, message_id, lenient) {
                result = Err(e);
                break;
            }
        }

        match result {
            Ok(()) => {
                let _ = association.release();
                info!(node = %job.target, count = job.files.len(), "C-STORE batch complete");
                Ok(())
            }
            Err(e) => {
                let _ = association.abort();
                Err(e)
            }
        }
    }
}

fn collect_sop_classes(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut classes: Vec<String> = Vec::new();
    for file in files {
        let obj = open_file(file).with_context(|| format!("Failed to open {}", file.display()))?;
        let sop_class = obj
            .element(tags::SOP_CLASS_UID)
            .context("Missing SOP Class UID")?
            .to_str()?
            .trim_end_matches('\0')
            .to_string();
        if !classes.contains(&sop_class) {
            classes.push(sop_class);
        }
    }
    Ok(classes)
}

fn store_file(
    association: &mut ClientAssociation,
    file: &Path,
    sop_classes: &[String],
    job: &PushJob<'_>,
    message_id: u16,
    lenient: bool,
) -> Result<()> {
    let mut obj = open_file(file).with_context(|| format!("Failed to open {}", file.display()))?;
    obj.put(DataElement::new(
        tags::SERIES_DESCRIPTION,
        VR::LO,
        PrimitiveValue::from(job.series_description),
    ));
    obj.put(DataElement::new(
        tags::SERIES_NUMBER,
        VR::IS,
        PrimitiveValue::from(job.series_number),
    ));

    let sop_class = obj
        .element(tags::SOP_CLASS_UID)
        .context("Missing SOP Class UID")?
        .to_str()?
        .trim_end_matches('\0')
        .to_string();
    let sop_instance = obj
        .element(tags::SOP_INSTANCE_UID)
        .context("Missing SOP Instance UID")?
        .to_str()?
        .trim_end_matches('\0')
        .to_string();

    let pc = accepted_context(association.presentation_contexts(), sop_classes, &sop_class)?;
    let pc_id = pc.id;
    let negotiated_ts_uid = pc.transfer_syntax.trim_end_matches('\0').to_string();

    let ts_command = TransferSyntaxRegistry
        .get(IMPLICIT_VR_LE)
        .context("Implicit VR Little Endian transfer syntax not found")?;
    let ts_data = TransferSyntaxRegistry
        .get(&negotiated_ts_uid)
        .with_context(|| format!("Negotiated transfer syntax {} not found", negotiated_ts_uid))?;

    let cmd = store_request(&sop_class, &sop_instance, message_id);
    let mut command_bytes = Vec::new();
    cmd.write_dataset_with_ts(&mut command_bytes, ts_command)
        .context("Failed to encode command set")?;
    let mut data_bytes = Vec::new();
    obj.write_dataset_with_ts(&mut data_bytes, ts_data)
        .context("Failed to encode data set")?;

    association
        .send(&Pdu::PData {
            data: vec![dicom_ul::pdu::PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: command_bytes,
            }],
        })
        .context("Failed to send C-STORE-RQ")?;
    {
        let mut writer = association.send_pdata(pc_id);
        writer
            .write_all(&data_bytes)
            .context("Failed to send data set")?;
    }

    let status = receive_status(association)?;
    match status {
        0x0000 => {
            debug!(sop_instance = %sop_instance, "C-STORE success");
            Ok(())
        }
        0xB000 | 0xB006 | 0xB007 => {
            warn!(sop_instance = %sop_instance, status = %format!("{:04X}H", status), "C-STORE completed with warning");
            Ok(())
        }
        other if lenient => {
            warn!(
                sop_instance = %sop_instance,
                status = %format!("{:04X}H", other),
                "C-STORE status ignored for unvalidated node"
            );
            Ok(())
        }
        other => bail!("C-STORE of {} failed with status {:04X}H", file.display(), other),
    }
}

/// The context accepted for `sop_class`. Contexts are proposed with odd ids in
/// the order of `sop_classes`; no other context may carry the data set.
fn accepted_context<'a>(
    contexts: &'a [PresentationContextResult],
    sop_classes: &[String],
    sop_class: &str,
) -> Result<&'a PresentationContextResult> {
    let proposed_id = sop_classes
        .iter()
        .position(|c| c == sop_class)
        .and_then(|idx| u8::try_from(idx * 2 + 1).ok());
    contexts
        .iter()
        .find(|pc| pc.reason == PresentationContextResultReason::Acceptance && Some(pc.id) == proposed_id)
        .with_context(|| format!("No accepted presentation context for {}", sop_class))
}

/// Command set for a C-STORE-RQ.
fn store_request(sop_class: &str, sop_instance: &str, message_id: u16) -> InMemDicomObject {
    let mut cmd = InMemDicomObject::new_empty();
    cmd.put(DataElement::new(
        Tag(0x0000, 0x0002),
        VR::UI,
        PrimitiveValue::from(sop_class),
    ));
    cmd.put(DataElement::new(
        Tag(0x0000, 0x0100),
        VR::US,
        PrimitiveValue::from(C_STORE_RQ),
    ));
    cmd.put(DataElement::new(
        Tag(0x0000, 0x0110),
        VR::US,
        PrimitiveValue::from(message_id),
    ));
    cmd.put(DataElement::new(
        Tag(0x0000, 0x0700),
        VR::US,
        PrimitiveValue::from(PRIORITY_MEDIUM),
    ));
    cmd.put(DataElement::new(
        Tag(0x0000, 0x0800),
        VR::US,
        PrimitiveValue::from(DATASET_PRESENT),
    ));
    cmd.put(DataElement::new(
        Tag(0x0000, 0x1000),
        VR::UI,
        PrimitiveValue::from(sop_instance),
    ));
    cmd
}

fn receive_status(association: &mut ClientAssociation) -> Result<u16> {
    let mut command = Vec::new();
    loop {
        match association.receive().context("Failed to receive C-STORE-RSP")? {
            Pdu::PData { data } => {
                let mut done = false;
                for pdv in data {
                    if pdv.value_type == PDataValueType::Command {
                        command.extend_from_slice(&pdv.data);
                        done |= pdv.is_last;
                    }
                }
                if done {
                    break;
                }
            }
            Pdu::AbortRQ { source } => bail!("Association aborted by peer: {:?}", source),
            Pdu::ReleaseRQ => bail!("Peer released the association before responding"),
            other => bail!("Unexpected PDU while waiting for C-STORE-RSP: {:?}", other),
        }
    }

    let ts = TransferSyntaxRegistry
        .get(IMPLICIT_VR_LE)
        .context("Implicit VR Little Endian transfer syntax not found")?;
    let rsp: InMemDicomObject = InMemDicomObject::read_dataset_with_ts(command.as_slice(), ts)
        .context("Failed to decode C-STORE-RSP")?;
    let status = rsp
        .element(tags::STATUS)
        .context("C-STORE-RSP without status")?
        .to_int::<u16>()
        .context("Invalid status in C-STORE-RSP")?;
    Ok(status)
}
