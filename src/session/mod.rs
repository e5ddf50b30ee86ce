//! 検出セッション
//!
//! アップロード → ラスタライズ → 検出 → 選択・ページ移動・ズーム → 保存 の状態を持つ。
//!
//! 非同期処理は `begin_*` で世代番号入りのチケットを受け取り、完了時に
//! `finish_upload` / `apply_detection` へ渡す。チケットの世代が古ければ
//! 結果は捨てる（新しいアップロードは常に優先）。
//!
//! ```text
//! Empty → FileLoading → Ready → Detecting → Annotated
//!              ↘ Error        ↘ (元の状態へ戻る)
//! ```

pub mod redraw;
pub mod status;

pub use redraw::{RedrawCause, RedrawFrame, RedrawScheduler};
pub use status::StatusPoller;

use crate::backend::DetectionBackend;
use crate::error::{ReviewError, Result};
use crate::raster::{PageImage, Rasterizer};
use crate::render::{self, Surface, ViewportSurface};
use crate::store::{ResultStore, SaveOutcome};
use crate::upload::{self, UploadPolicy, UploadedFile};
use base64::Engine as _;
use layout_review_common::{
    fit_to_container, AnnotatedDetection, BackendStatus, CoordinateMapper, DetectionBatch, DetectionId, IdSequence,
    ImageSize, Point, RecordBody, ResultRecord, Size, Thresholds, UatStatus, Viewport, ZoomLimits,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Cursor;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    FileLoading,
    /// 読み込み済み・検出なし
    Ready,
    Detecting,
    Annotated,
    Error,
}

impl Phase {
    fn is_stable(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Annotated)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Empty => "empty",
            Phase::FileLoading => "file-loading",
            Phase::Ready => "ready",
            Phase::Detecting => "detecting",
            Phase::Annotated => "annotated",
            Phase::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// ユーザーへの通知（エラーではないもの）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// 検出0件。信頼度を下げることを促す
    NoDetections,
    Detected(usize),
    Saved { total_results: usize },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::NoDetections => write!(f, "検出結果がありません（信頼度の閾値を下げてみてください）"),
            Notice::Detected(n) => write!(f, "{}件検出しました", n),
            Notice::Saved { total_results } => write!(f, "保存しました（保存済み {}件）", total_results),
        }
    }
}

/// 非同期結果を適用したかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// 世代が古いため破棄
    Discarded,
}

#[derive(Debug)]
pub struct UploadTicket {
    generation: u64,
    file: UploadedFile,
}

impl UploadTicket {
    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct DetectTicket {
    generation: u64,
    file: UploadedFile,
    thresholds: Thresholds,
}

impl DetectTicket {
    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// 読み込み済みファイルとページ
#[derive(Debug)]
pub struct Document {
    file: UploadedFile,
    pages: Vec<PageImage>,
    /// バックエンドが報告したページごとの座標系サイズ
    coordinate_sizes: BTreeMap<u32, Size>,
}

impl Document {
    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page(&self, page_number: u32) -> Option<&PageImage> {
        let index = page_number.checked_sub(1)? as usize;
        self.pages.get(index)
    }

    /// 検出座標の基準サイズ（報告がなければラスタのサイズ）
    pub fn coordinate_size(&self, page_number: u32) -> Option<Size> {
        self.coordinate_sizes
            .get(&page_number)
            .copied()
            .or_else(|| self.page(page_number).map(PageImage::natural_size))
    }
}

/// クラス別件数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSummary {
    pub current_page: BTreeMap<String, usize>,
    pub all_pages: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct Session {
    generation: u64,
    phase: Phase,
    /// 失敗時に戻る状態
    resume: Phase,
    document: Option<Document>,
    detections: Vec<AnnotatedDetection>,
    ids: IdSequence,
    selected: Option<DetectionId>,
    current_page: u32,
    viewport: Viewport,
    container: Option<Size>,
    thresholds: Thresholds,
    policy: UploadPolicy,
    backend_status: BackendStatus,
    last_error: Option<String>,
    notice: Option<Notice>,
    saved: bool,
    redraw: RedrawScheduler,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ZoomLimits::EDITOR, UploadPolicy::default())
    }
}

impl Session {
    pub fn new(limits: ZoomLimits, policy: UploadPolicy) -> Self {
        Self {
            generation: 0,
            phase: Phase::Empty,
            resume: Phase::Empty,
            document: None,
            detections: Vec::new(),
            ids: IdSequence::new(),
            selected: None,
            current_page: 1,
            viewport: Viewport::new(limits),
            container: None,
            thresholds: Thresholds::default(),
            policy,
            backend_status: BackendStatus::Unknown,
            last_error: None,
            notice: None,
            saved: false,
            redraw: RedrawScheduler::new(),
        }
    }

    // ---- 参照 ----

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn detections(&self) -> &[AnnotatedDetection] {
        &self.detections
    }

    pub fn selected(&self) -> Option<DetectionId> {
        self.selected
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, Document::page_count)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn backend_status(&self) -> BackendStatus {
        self.backend_status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// 表示中ページの検出
    pub fn visible_detections(&self) -> impl Iterator<Item = &AnnotatedDetection> + '_ {
        let page = self.current_page;
        self.detections.iter().filter(move |d| d.page_number() == page)
    }

    pub fn visible_count(&self) -> usize {
        self.visible_detections().count()
    }

    pub fn take_redraw(&mut self) -> Option<RedrawFrame> {
        self.redraw.take_frame()
    }

    // ---- アップロード ----

    /// 検証に失敗した場合、既存のセッションには触れない
    pub fn accept_upload(&mut self, name: &str, bytes: Vec<u8>) -> Result<UploadTicket> {
        let file = match upload::validate(name, bytes, &self.policy) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("upload rejected: {}", e);
                if matches!(self.phase, Phase::Empty | Phase::Error) && self.document.is_none() {
                    self.phase = Phase::Error;
                    self.last_error = Some(e.to_string());
                }
                return Err(e);
            }
        };

        self.generation += 1;
        if self.phase.is_stable() {
            self.resume = self.phase;
        } else if self.document.is_none() {
            self.resume = Phase::Error;
        }
        self.phase = Phase::FileLoading;
        self.last_error = None;
        self.notice = None;

        log::info!("loading {} ({}, {} bytes)", file.name(), file.kind(), file.size());
        Ok(UploadTicket {
            generation: self.generation,
            file,
        })
    }

    /// ラスタライズ結果を反映。失敗時は直前の安定状態へ戻してエラーを返す
    pub fn finish_upload(&mut self, ticket: UploadTicket, result: Result<Vec<PageImage>>) -> Result<Completion> {
        if ticket.generation != self.generation {
            log::debug!("discarding stale upload result (gen {} < {})", ticket.generation, self.generation);
            return Ok(Completion::Discarded);
        }

        let pages = match result {
            Ok(pages) if pages.is_empty() => Err(ReviewError::UnsupportedFormat("ページがありません".into())),
            other => other,
        };

        let pages = match pages {
            Ok(pages) => pages,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.document = Some(Document {
            file: ticket.file,
            pages,
            coordinate_sizes: BTreeMap::new(),
        });
        self.detections.clear();
        self.selected = None;
        self.current_page = 1;
        self.viewport.reset();
        self.saved = false;
        self.phase = Phase::Ready;
        self.resume = Phase::Ready;

        self.redraw.request(RedrawCause::Page);
        self.redraw.request(RedrawCause::Detections);
        self.redraw.request(RedrawCause::NaturalSize);
        Ok(Completion::Applied)
    }

    /// 検証 → ラスタライズ → 反映
    pub async fn load(&mut self, rasterizer: &Rasterizer, name: &str, bytes: Vec<u8>) -> Result<Completion> {
        let ticket = self.accept_upload(name, bytes)?;
        let pages = rasterizer.load_pages(ticket.file()).await;
        self.finish_upload(ticket, pages)
    }

    // ---- 検出 ----

    pub fn begin_detect(&mut self) -> Result<DetectTicket> {
        if !self.phase.is_stable() {
            return Err(self.reject(ReviewError::InvalidState(format!("{} の間は検出できません", self.phase))));
        }
        if !self.backend_status.allows_detect() {
            return Err(self.reject(ReviewError::InvalidState("バックエンドに接続されていません".into())));
        }
        let Some(file) = self.document.as_ref().map(|d| d.file.clone()) else {
            return Err(self.reject(ReviewError::InvalidState("ファイルが読み込まれていません".into())));
        };

        self.generation += 1;
        self.resume = self.phase;
        self.phase = Phase::Detecting;
        self.last_error = None;

        Ok(DetectTicket {
            generation: self.generation,
            file,
            thresholds: self.thresholds,
        })
    }

    /// 検出結果を反映。既存の検出はすべて置き換える
    pub fn apply_detection(&mut self, ticket: DetectTicket, result: Result<DetectionBatch>) -> Result<Completion> {
        if ticket.generation != self.generation {
            log::debug!("discarding stale detection result (gen {} < {})", ticket.generation, self.generation);
            return Ok(Completion::Discarded);
        }

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let count = batch.len();
        self.detections = batch
            .detections
            .into_iter()
            .map(|det| AnnotatedDetection::new(self.ids.next_id(), det))
            .collect();

        if let Some(document) = &mut self.document {
            document.coordinate_sizes = batch.page_sizes;
        }

        self.selected = None;
        self.saved = false;
        self.phase = Phase::Annotated;
        self.resume = Phase::Annotated;
        self.notice = Some(if count == 0 {
            Notice::NoDetections
        } else {
            Notice::Detected(count)
        });
        log::info!("{} detections ({} on page {})", count, self.visible_count(), self.current_page);

        self.redraw.request(RedrawCause::Detections);
        self.redraw.request(RedrawCause::NaturalSize);
        Ok(Completion::Applied)
    }

    pub async fn detect<B: DetectionBackend>(&mut self, backend: &B) -> Result<Completion> {
        let ticket = self.begin_detect()?;
        let result = backend
            .detect(ticket.file(), ticket.thresholds())
            .await
            .map(|response| response.into_batch());
        self.apply_detection(ticket, result)
    }

    pub fn set_thresholds(&mut self, confidence: f64, iou: f64) -> Thresholds {
        self.thresholds = Thresholds::new(confidence, iou);
        self.thresholds
    }

    /// 切断中は検出できなくなるが、表示中の内容は消さない
    pub fn set_backend_status(&mut self, status: BackendStatus) -> bool {
        if self.backend_status == status {
            return false;
        }
        log::info!("backend {} -> {}", self.backend_status, status);
        self.backend_status = status;
        true
    }

    /// 監視タスクが配信した最新の状態を取り込む
    pub fn observe_status(&mut self, rx: &mut watch::Receiver<BackendStatus>) -> bool {
        let status = *rx.borrow_and_update();
        self.set_backend_status(status)
    }

    /// 削除したIDは再利用されない
    pub fn remove_detection(&mut self, id: DetectionId) -> bool {
        let before = self.detections.len();
        self.detections.retain(|d| d.id != id);
        if self.detections.len() == before {
            return false;
        }

        if self.selected == Some(id) {
            self.selected = None;
        }
        self.saved = false;
        self.redraw.request(RedrawCause::Detections);
        true
    }

    pub fn class_summary(&self) -> ClassSummary {
        let mut summary = ClassSummary::default();
        for det in &self.detections {
            let name = det.detection.class_name.clone();
            if det.page_number() == self.current_page {
                *summary.current_page.entry(name.clone()).or_default() += 1;
            }
            *summary.all_pages.entry(name).or_default() += 1;
        }
        summary
    }

    // ---- 選択 ----

    /// 表示中ページにない検出は選択できない（None になる）
    pub fn select(&mut self, id: Option<DetectionId>) -> bool {
        let id = id.filter(|id| self.visible_detections().any(|d| d.id == *id));
        if self.selected == id {
            return false;
        }
        self.selected = id;
        self.redraw.request(RedrawCause::Selection);
        true
    }

    /// 表示座標でクリック。何もなければ選択解除
    pub fn click_display(&mut self, point: Point) -> Result<Option<DetectionId>> {
        let mapper = self.mapper()?;
        let hit = render::hit_test_display(self.visible_detections(), &mapper, point);
        self.select(hit);
        Ok(hit)
    }

    /// ズーム・パン適用後の画面座標でクリック
    pub fn click_screen(&mut self, point: Point) -> Result<Option<DetectionId>> {
        let display = self.viewport.screen_to_display(point);
        self.click_display(display)
    }

    // ---- ページ ----

    pub fn go_to_page(&mut self, page_number: u32) -> Result<bool> {
        let count = self.page_count();
        if page_number == 0 || page_number > count {
            return Err(ReviewError::InvalidState(format!(
                "ページ {} は範囲外です（1〜{}）",
                page_number, count
            )));
        }
        if page_number == self.current_page {
            return Ok(false);
        }

        self.current_page = page_number;
        self.selected = None;
        self.redraw.request(RedrawCause::Page);
        self.redraw.request(RedrawCause::NaturalSize);
        self.redraw.request(RedrawCause::Selection);
        Ok(true)
    }

    pub fn next_page(&mut self) -> bool {
        self.current_page < self.page_count() && self.go_to_page(self.current_page + 1).unwrap_or(false)
    }

    pub fn prev_page(&mut self) -> bool {
        self.current_page > 1 && self.go_to_page(self.current_page - 1).unwrap_or(false)
    }

    // ---- 表示 ----

    /// 表示領域のサイズ。高さ無制限なら `f64::INFINITY`
    pub fn set_container(&mut self, container: Size) {
        if self.container != Some(container) {
            self.container = Some(container);
            self.redraw.request(RedrawCause::NaturalSize);
        }
    }

    fn display_size_for(&self, natural: Size) -> Size {
        self.container
            .and_then(|c| fit_to_container(natural, c))
            .unwrap_or(natural)
    }

    /// 表示中ページの座標変換（毎回現在の状態から作る）
    pub fn mapper(&self) -> Result<CoordinateMapper> {
        self.mapper_for_page(self.current_page)
    }

    pub fn mapper_for_page(&self, page_number: u32) -> Result<CoordinateMapper> {
        let natural = self
            .document
            .as_ref()
            .and_then(|d| d.coordinate_size(page_number))
            .ok_or(ReviewError::NotReady)?;
        Ok(CoordinateMapper::new(natural, self.display_size_for(natural))?)
    }

    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        self.viewport_changed(|vp| vp.set_zoom(zoom))
    }

    pub fn zoom_in(&mut self) -> bool {
        self.viewport_changed(Viewport::zoom_in)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.viewport_changed(Viewport::zoom_out)
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        self.viewport_changed(|vp| vp.pan_by(dx, dy))
    }

    pub fn reset_view(&mut self) -> bool {
        self.viewport_changed(Viewport::reset)
    }

    fn viewport_changed(&mut self, f: impl FnOnce(&mut Viewport) -> bool) -> bool {
        let changed = f(&mut self.viewport);
        if changed {
            self.redraw.request(RedrawCause::Viewport);
        }
        changed
    }

    /// 表示中ページを描画。サイズ未確定なら `NotReady`（そのフレームは描かない）
    pub fn render<S: Surface + ?Sized>(&self, surface: &mut S) -> Result<()> {
        self.render_page(surface, self.current_page)
    }

    pub fn render_page<S: Surface + ?Sized>(&self, surface: &mut S, page_number: u32) -> Result<()> {
        let mapper = self.mapper_for_page(page_number)?;
        let page = self
            .document
            .as_ref()
            .and_then(|d| d.page(page_number))
            .ok_or(ReviewError::NotReady)?;

        let detections = self.detections.iter().filter(|d| d.page_number() == page_number);
        // 選択は表示中ページのみ
        let selected = self.selected.filter(|_| page_number == self.current_page);

        let mut view = ViewportSurface::new(surface, self.viewport);
        render::render(&mut view, page.image(), detections, selected, &mapper);
        Ok(())
    }

    // ---- 保存・エクスポート ----

    /// エクスポート用の本体。保存状態に関係なく作れる
    pub fn record_body(&self, status: UatStatus, note: &str) -> Result<RecordBody> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| ReviewError::InvalidState("ファイルが読み込まれていません".into()))?;
        let file = document.file();

        let image_data = if file.is_pdf() {
            let first = document.page(1).ok_or(ReviewError::NotReady)?;
            let mut png = Vec::new();
            first
                .image()
                .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| ReviewError::Decode(format!("PNGエンコードに失敗: {}", e)))?;
            data_url("image/png", &png)
        } else {
            data_url(file.mime(), file.bytes())
        };

        let size = document.coordinate_size(1).ok_or(ReviewError::NotReady)?;

        Ok(RecordBody {
            image_name: file.name().to_string(),
            image_data,
            image_size: ImageSize {
                width: size.width.round() as u32,
                height: size.height.round() as u32,
            },
            detections: self.detections.iter().map(|d| d.detection.clone()).collect(),
            uat_status: status,
            uat_note: note.to_string(),
            is_pdf: file.is_pdf().then_some(true),
            total_pages: file.is_pdf().then(|| document.page_count()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// 保存用レコード。検出済み（1件以上）であること
    pub fn snapshot_record(&self, status: UatStatus, note: &str) -> Result<ResultRecord> {
        if self.phase != Phase::Annotated || self.detections.is_empty() {
            return Err(ReviewError::InvalidState("保存できる検出結果がありません".into()));
        }
        let body = self.record_body(status, note)?;
        let id = record_id(&body.image_name, &body.timestamp);
        Ok(ResultRecord::new(id, body)?)
    }

    /// 重複時は `Conflict`。検出結果は消さず、保存済みにもしない
    pub async fn save<S: ResultStore>(&mut self, store: &S, status: UatStatus, note: &str) -> Result<SaveOutcome> {
        let record = self.snapshot_record(status, note)?;
        match store.save(record).await {
            Ok(outcome) => {
                self.saved = true;
                self.last_error = None;
                self.notice = Some(Notice::Saved {
                    total_results: outcome.total_results,
                });
                Ok(outcome)
            }
            Err(e) => {
                log::warn!("save failed: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // ---- 内部 ----

    fn fail(&mut self, e: &ReviewError) {
        log::warn!("{}", e);
        self.last_error = Some(e.to_string());
        self.phase = if self.document.is_some() && self.resume.is_stable() {
            self.resume
        } else {
            Phase::Error
        };
    }

    fn reject(&mut self, e: ReviewError) -> ReviewError {
        self.last_error = Some(e.to_string());
        e
    }
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// 画像名と時刻から決まるレコードID（16桁hex）
fn record_id(image_name: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(timestamp.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
