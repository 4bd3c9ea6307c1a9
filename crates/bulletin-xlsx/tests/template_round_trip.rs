use std::io::{Cursor, Read, Write};

use bulletin_model::{Cell, CellRef, CellValue, Range, Style};
use bulletin_xlsx::{XlsxDocument, XlsxError, XlsxPackageLimits};
use pretty_assertions::assert_eq;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Report" sheetId="1" r:id="rId1"/><sheet name="Summary" sheetId="2" r:id="rId2"/></sheets><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Report!$A$1:$C$5</definedName></definedNames><calcPr calcId="191029"/></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="2"><border><left/><right/><top/><bottom/><diagonal/></border><border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="1" xfId="0" applyFont="1" applyBorder="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>{{header:region}}</t></si><si><t>{{data:name}}</t></si><si><r><rPr><b/></rPr><t>Total</t></r></si></sst>"#;

const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:C5"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><cols><col min="1" max="1" width="28" customWidth="1"/></cols><sheetData><row r="2" ht="22" customHeight="1"><c r="A2" s="1" t="s"><v>0</v></c><c r="B2" s="1"/></row><row r="3"><c r="A3" s="2" t="s"><v>1</v></c><c r="B3" s="2"><v>4</v></c></row><row r="5"><c r="A5" t="s"><v>2</v></c><c r="B5"><f>SUM(B1:B4)</f><v>4</v></c><c r="C5"><f t="array" ref="C5">MAX(B1:B4*2)</f><v>8</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A2:B2"/></mergeCells><conditionalFormatting sqref="A5:B5"><cfRule type="expression" dxfId="0" priority="1"><formula>$B$5&gt;0</formula></cfRule></conditionalFormatting><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

const SHEET2: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><f>Report!B5*2</f><v>8</v></c></row></sheetData></worksheet>"#;

fn build_zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        zip.start_file(*name, options).expect("start_file");
        zip.write_all(bytes).expect("write entry bytes");
    }

    zip.finish().expect("finish").into_inner()
}

fn template_bytes() -> Vec<u8> {
    build_zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", WORKBOOK.as_bytes()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ("xl/styles.xml", STYLES.as_bytes()),
        ("xl/sharedStrings.xml", SHARED_STRINGS.as_bytes()),
        ("xl/worksheets/sheet1.xml", SHEET1.as_bytes()),
        ("xl/worksheets/sheet2.xml", SHEET2.as_bytes()),
        ("xl/calcChain.xml", br#"<calcChain><c r="B5" i="1"/></calcChain>"#),
        ("docProps/app.xml", b"<Properties/>"),
    ])
}

fn read_part(bytes: &[u8], name: &str) -> Option<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("zip");
    let mut file = archive.by_name(name).ok()?;
    let mut out = String::new();
    file.read_to_string(&mut out).expect("utf-8 part");
    Some(out)
}

fn cell(a1: &str) -> CellRef {
    CellRef::from_a1(a1).unwrap()
}

#[test]
fn load_exposes_values_styles_and_merges() {
    let doc = XlsxDocument::load_from_bytes(&template_bytes()).expect("load");
    let report = doc.workbook.sheet_by_name("report").expect("case-insensitive lookup");

    assert_eq!(report.value(cell("A2")), &CellValue::String("{{header:region}}".into()));
    assert_eq!(report.value(cell("A5")), &CellValue::String("Total".into()));
    assert_eq!(
        report.cell(cell("B5")).and_then(|c| c.formula.as_deref()),
        Some("SUM(B1:B4)")
    );
    let a3_style = report.cell(cell("A3")).unwrap().style_id;
    assert_eq!(doc.workbook.styles.get(a3_style), Some(&Style::from_xf(2)));
    assert_eq!(report.row_properties(1).and_then(|p| p.height), Some(22.0));
    assert_eq!(
        report.merges().iter().collect::<Vec<_>>(),
        vec![Range::from_a1("A2:B2").unwrap()]
    );
    assert_eq!(doc.sheet_part_name(1), Some("xl/worksheets/sheet2.xml"));
}

#[test]
fn unmodified_save_preserves_template_parts() {
    let template = template_bytes();
    let doc = XlsxDocument::load_from_bytes(&template).expect("load");
    let saved = doc.save_to_bytes().expect("save");

    assert_eq!(read_part(&saved, "docProps/app.xml").as_deref(), Some("<Properties/>"));
    assert_eq!(read_part(&saved, "xl/styles.xml").as_deref(), Some(STYLES));

    let sheet1 = read_part(&saved, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet1.contains(r#"<col min="1" max="1" width="28" customWidth="1"/>"#), "{sheet1}");
    assert!(sheet1.contains(r#"<c r="A2" s="1" t="s"><v>0</v></c><c r="B2" s="1"/>"#), "{sheet1}");
    assert!(sheet1.contains(r#"<mergeCells count="1"><mergeCell ref="A2:B2"/></mergeCells>"#));

    // Rich shared strings keep their runs.
    let sst = read_part(&saved, "xl/sharedStrings.xml").unwrap();
    assert!(sst.contains("<si><r><rPr><b/></rPr><t>Total</t></r></si>"), "{sst}");

    let reloaded = XlsxDocument::load_from_bytes(&saved).expect("reload");
    assert_eq!(reloaded.workbook.sheets, doc.workbook.sheets);
}

#[test]
fn inserted_rows_and_new_formats_survive_save() {
    let mut doc = XlsxDocument::load_from_bytes(&template_bytes()).expect("load");
    let report = doc.workbook.sheet_index("Report").unwrap();

    let rewritten = doc.workbook.insert_rows(report, 3, 2).unwrap();
    assert_eq!(rewritten, 3);

    let base = doc.workbook.sheets[report].cell(cell("B3")).unwrap().style_id;
    let formatted = doc.workbook.styles.with_number_format(base, "0.000");
    let sheet = &mut doc.workbook.sheets[report];
    sheet.set_cell(cell("B4"), Cell::new(CellValue::Number(12.25)).with_style(formatted));
    sheet.set_value(cell("A4"), "Rivière-du-Loup");

    let saved = doc.save_to_bytes().expect("save");

    let sheet1 = read_part(&saved, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet1.contains(r#"<dimension ref="A2:C7"/>"#), "{sheet1}");
    assert!(sheet1.contains(r#"<c r="B7"><f>SUM(B1:B6)</f><v>4</v></c>"#), "{sheet1}");
    assert!(
        sheet1.contains(r#"<c r="C7"><f t="array" ref="C7">MAX(B1:B6*2)</f><v>8</v></c>"#),
        "{sheet1}"
    );
    // Conditional formats and the print area follow the rows they covered.
    assert!(
        sheet1.contains(r#"<conditionalFormatting sqref="A7:B7"><cfRule type="expression" dxfId="0" priority="1"><formula>$B$7&gt;0</formula></cfRule></conditionalFormatting>"#),
        "{sheet1}"
    );
    assert!(sheet1.contains(r#"<c r="B4" s="3"><v>12.25</v></c>"#), "{sheet1}");

    let sheet2 = read_part(&saved, "xl/worksheets/sheet2.xml").unwrap();
    assert!(sheet2.contains("<f>Report!B7*2</f>"), "{sheet2}");

    let styles = read_part(&saved, "xl/styles.xml").unwrap();
    assert!(
        styles.contains(r#"<numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts>"#),
        "{styles}"
    );
    assert!(styles.contains(r#"<cellXfs count="4">"#), "{styles}");

    let sst = read_part(&saved, "xl/sharedStrings.xml").unwrap();
    assert!(sst.contains("<si><t>Rivière-du-Loup</t></si>"), "{sst}");

    // Cached results are stale after the shift, so the calc chain goes and a recalc is forced.
    assert!(read_part(&saved, "xl/calcChain.xml").is_none());
    let workbook = read_part(&saved, "xl/workbook.xml").unwrap();
    assert!(workbook.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#), "{workbook}");
    assert!(
        workbook.contains(r#"<definedName name="_xlnm.Print_Area" localSheetId="0">Report!$A$1:$C$7</definedName>"#),
        "{workbook}"
    );
    let rels = read_part(&saved, "xl/_rels/workbook.xml.rels").unwrap();
    assert!(!rels.contains("calcChain"), "{rels}");
    let content_types = read_part(&saved, "[Content_Types].xml").unwrap();
    assert!(!content_types.contains("calcChain"), "{content_types}");

    let reloaded = XlsxDocument::load_from_bytes(&saved).expect("reload");
    let report = reloaded.workbook.sheet_by_name("Report").unwrap();
    assert_eq!(
        report.merges().iter().collect::<Vec<_>>(),
        vec![Range::from_a1("A2:B2").unwrap()]
    );
    let b4 = report.cell(cell("B4")).unwrap();
    assert_eq!(b4.value, CellValue::Number(12.25));
    assert_eq!(reloaded.workbook.styles.get(b4.style_id), Some(&Style::from_xf(3)));
}

#[test]
fn missing_shared_strings_part_is_created_on_save() {
    let rels = WORKBOOK_RELS.replace(
        r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
        "",
    );
    let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>{{general:date}}</t></is></c></row></sheetData></worksheet>"#;
    let bytes = build_zip_bytes(&[
        ("[Content_Types].xml", CONTENT_TYPES.replace("/xl/sharedStrings.xml", "/xl/unused.xml").as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", WORKBOOK.as_bytes()),
        ("xl/_rels/workbook.xml.rels", rels.as_bytes()),
        ("xl/styles.xml", STYLES.as_bytes()),
        ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
        ("xl/worksheets/sheet2.xml", SHEET2.as_bytes()),
    ]);

    let doc = XlsxDocument::load_from_bytes(&bytes).expect("load");
    let saved = doc.save_to_bytes().expect("save");

    let sst = read_part(&saved, "xl/sharedStrings.xml").expect("shared strings written");
    assert!(sst.contains("<si><t>{{general:date}}</t></si>"), "{sst}");
    let rels = read_part(&saved, "xl/_rels/workbook.xml.rels").unwrap();
    assert!(
        rels.contains(r#"Id="rId6" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml""#),
        "{rels}"
    );
    let content_types = read_part(&saved, "[Content_Types].xml").unwrap();
    assert!(content_types.contains(r#"PartName="/xl/sharedStrings.xml""#), "{content_types}");
}

#[test]
fn save_to_path_replaces_destination() {
    let dir = tempfile::tempdir().expect("temp dir");
    let out = dir.path().join("bulletin.xlsx");
    std::fs::write(&out, b"stale").unwrap();

    let doc = XlsxDocument::load_from_bytes(&template_bytes()).expect("load");
    doc.save_to_path(&out).expect("save");

    let reloaded = XlsxDocument::load_from_path(&out).expect("reload from disk");
    assert_eq!(reloaded.workbook.sheets.len(), 2);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("bulletin.xlsx")]);
}

#[test]
fn oversized_parts_are_rejected() {
    let limits = XlsxPackageLimits {
        max_part_bytes: 512,
        max_total_bytes: u64::MAX,
    };
    let err = XlsxDocument::load_from_bytes_limited(&template_bytes(), limits).unwrap_err();
    assert!(matches!(err, XlsxError::PartTooLarge { .. }), "{err:?}");
}
